//! Static command texts

pub const START_TEXT: &str = "Hi! I'm a reminder bot.\n\
To add a reminder send /remind and I'll ask what and when, or do it in one go:\n\
/remind <text> YYYY-MM-DD HH:MM\n\
/remind <text> HH:MM (today, or tomorrow if that time has passed)\n\n\
Send /help to see every command.";

pub const HELP_TEXT: &str = "Commands:\n\
/start - introduction\n\
/remind - create a reminder step by step\n\
/remind <text> YYYY-MM-DD HH:MM - create a reminder in one message\n\
/remind <text> HH:MM - create a reminder for the next HH:MM\n\
/list - show your pending reminders\n\
/cancel - delete a reminder step by step\n\
/cancel <number> - delete reminder <number> from /list\n\
/stop - abandon the current step-by-step flow\n\
/help - this message";
