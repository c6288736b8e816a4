//! Classification of `depends_on.nodes` entries
//!
//! A dependency id is either `source.<project>.<source>.<table>` or
//! `model.<project>.<name>`. Anything else (seeds, snapshots, malformed
//! strings) is rejected so the caller can record and skip it.

use lineagegraph_core::{IdentifierError, ModelKey};

const SOURCE_PREFIX: &str = "source.";
const MODEL_PREFIX: &str = "model.";

/// A classified model dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// A declared source table
    Source {
        /// The full dependency id, also the key into the manifest's `sources`
        unique_id: String,
        project: String,
        source_name: String,
        table_name: String,
    },

    /// Another model of the project
    Model(ModelKey),
}

impl Dependency {
    pub fn parse(id: &str) -> Result<Self, IdentifierError> {
        if id.starts_with(SOURCE_PREFIX) {
            let parts: Vec<&str> = id.split('.').collect();

            // The last four parts are kind.project.source.table
            match parts.as_slice() {
                [.., _, project, source_name, table_name] => {
                    if project.is_empty() || source_name.is_empty() || table_name.is_empty() {
                        return Err(IdentifierError::MalformedSourceDependency(id.to_string()));
                    }

                    Ok(Self::Source {
                        unique_id: id.to_string(),
                        project: project.to_string(),
                        source_name: source_name.to_string(),
                        table_name: table_name.to_string(),
                    })
                }
                _ => Err(IdentifierError::MalformedSourceDependency(id.to_string())),
            }
        } else if id.starts_with(MODEL_PREFIX) && id.len() > MODEL_PREFIX.len() {
            Ok(Self::Model(ModelKey::new(id)))
        } else {
            Err(IdentifierError::UnknownDependencyKind(id.to_string()))
        }
    }
}
