//! Template repository port — read access to workflow templates.

use std::future::Future;

use dealflow_domain::error::DealflowError;
use dealflow_domain::id::TemplateId;
use dealflow_domain::template::WorkflowTemplate;

/// Read-only lookup of [`WorkflowTemplate`]s.
pub trait TemplateRepository: Send + Sync {
    /// Get a template by its unique identifier.
    fn get_by_id(
        &self,
        id: TemplateId,
    ) -> impl Future<Output = Result<Option<WorkflowTemplate>, DealflowError>> + Send;
}
