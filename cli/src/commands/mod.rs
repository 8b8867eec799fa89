mod helpers;
mod log;
mod remind;
mod summary;
mod target;

pub(crate) use log::{cmd_clear, cmd_delete, cmd_log};
pub(crate) use remind::{cmd_remind_interval, cmd_remind_test, cmd_remind_watch};
pub(crate) use summary::{cmd_history, cmd_summary};
pub(crate) use target::{cmd_target_set, cmd_target_show};
