use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateSkeletonError {
    #[error("skeleton must contain at least one bone")]
    Empty,

    #[error("invalid topology: bone {index} has parent {parent} which does not precede it")]
    InvalidTopology { index: usize, parent: i64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("pose was created for a different skeleton")]
pub struct IncompatibleSkeletonError;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no bone named {0:?}")]
pub struct JointNotFoundError(pub String);
