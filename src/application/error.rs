use thiserror::Error;

use crate::{
    application::{
        export::ExportError, render::RenderError, repos::RepoError, workspace::WorkspaceError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(_)
            | AppError::Validation(_)
            | AppError::Workspace(WorkspaceError::Validation(_))
            | AppError::Export(ExportError::Validation { .. }) => 2,
            AppError::NotFound
            | AppError::Repo(RepoError::NotFound)
            | AppError::Workspace(WorkspaceError::NotFound { .. }) => 3,
            AppError::Export(ExportError::Cancelled) => 130,
            _ => 1,
        }
    }
}
