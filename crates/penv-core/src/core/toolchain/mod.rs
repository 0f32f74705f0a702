mod check;
mod install;
mod upgrade;
mod version;

pub use check::{check_env, check_python, CheckEnvRequest, CheckPythonRequest, EnvironmentReport};
pub use install::{install, InstallRequest};
pub use upgrade::UpgradeDecision;
