//! Projects and the lists created with them

pub mod orchestrator;
pub mod types;

pub use orchestrator::{
    project_path, ProjectListRepositories, ProjectService, ProjectSourceLists,
};
pub use types::{Project, ProjectInput, ProjectStatus};
