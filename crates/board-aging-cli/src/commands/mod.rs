mod cases;
mod run;

pub use cases::cmd_cases;
pub use run::{RunArgs, cmd_run};
