use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("package {0:?} not found")]
    NotFound(String),
    #[error("no available package belongs to task {0:?}")]
    EmptyTask(String),
    #[error("package matching {dependency:?} required by {package} not found")]
    Unsatisfiable { package: String, dependency: String },
    #[error(
        "manual choice needed for {dependency:?} required by {package}, candidates: {}",
        .candidates.join(", ")
    )]
    Ambiguous {
        package: String,
        dependency: String,
        candidates: Vec<String>,
    },
}
