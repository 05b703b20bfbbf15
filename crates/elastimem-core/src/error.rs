use crate::cgroups::CgroupError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cgroup error: {0}")]
    Cgroup(#[from] CgroupError),

    #[error("Host memory probe error: {0}")]
    HostMemory(String),

    #[error("Process probe error: {0}")]
    Process(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
