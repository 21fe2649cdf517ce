use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("authorization failed")]
    Authorization,
}

impl ApplicationError {
    /// 取出领域错误种类，便于调用方区分
    pub fn domain_kind(&self) -> Option<&DomainError> {
        match self {
            ApplicationError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            // 事务内被拒绝的业务规则按领域错误上报
            RepositoryError::Rejected(err) => ApplicationError::Domain(err),
            other => ApplicationError::Repository(other),
        }
    }
}
