use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::Path,
};

use crate::{error::RamifyError, graph::MAX_TRAVERSAL_DEPTH};

pub const DEFAULT_CHUNK_SIZE: usize = 256;
pub const DEFAULT_MAX_DEPTH: usize = 128;
pub const DEFAULT_AUDIT_CADENCE: u64 = 512;
pub const DEFAULT_GRAPH_DEPTH: usize = 2;
pub const DEFAULT_GRAPH_MAX_NODES: usize = 64;

/// Fallback query bounds for graph views when callers pass no explicit
/// limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDefaults {
    pub depth: usize,
    pub max_nodes: usize,
}

impl Default for GraphDefaults {
    fn default() -> Self {
        GraphDefaults {
            depth: DEFAULT_GRAPH_DEPTH,
            max_nodes: DEFAULT_GRAPH_MAX_NODES,
        }
    }
}

/// Tuning knobs for one workspace engine. Values are clamped to sane
/// minimums on load; a zero chunk size or depth guard would deadlock bulk
/// operations or reject every reparent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Blocks processed per writer-section slice during imports and index
    /// rebuilds.
    pub chunk_size: usize,
    /// Ancestor-walk bound for reparent cycle checks and path queries.
    pub max_depth: usize,
    /// Mutations between inline index self-audits.
    pub audit_cadence: u64,
    pub graph: GraphDefaults,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            audit_cadence: DEFAULT_AUDIT_CADENCE,
            graph: GraphDefaults::default(),
        }
    }
}

impl WorkspaceConfig {
    /// Read a config from a TOML file, falling back to defaults when the
    /// file does not exist. Out-of-range values are clamped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RamifyError> {
        tracing::debug!("Reading workspace config from {:?}", path.as_ref());
        if !path.as_ref().exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(WorkspaceConfig::default());
        }
        let content = read_to_string(path)?;
        let config: WorkspaceConfig = toml::from_str(&content)?;
        Ok(config.sanitized())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RamifyError> {
        tracing::debug!("Writing workspace config to {:?}", path.as_ref());
        let toml_string = toml::to_string(self)?;
        write(path, toml_string)?;
        Ok(())
    }

    pub fn sanitized(mut self) -> Self {
        if self.chunk_size == 0 {
            tracing::warn!("chunk_size 0 clamped to 1");
            self.chunk_size = 1;
        }
        if self.max_depth == 0 {
            tracing::warn!("max_depth 0 clamped to 1");
            self.max_depth = 1;
        }
        if self.audit_cadence == 0 {
            tracing::warn!("audit_cadence 0 clamped to 1");
            self.audit_cadence = 1;
        }
        if self.graph.max_nodes == 0 {
            tracing::warn!("graph.max_nodes 0 clamped to 1");
            self.graph.max_nodes = 1;
        }
        if self.graph.depth > MAX_TRAVERSAL_DEPTH {
            tracing::warn!(
                "graph.depth {} clamped to the traversal guard {MAX_TRAVERSAL_DEPTH}",
                self.graph.depth
            );
            self.graph.depth = MAX_TRAVERSAL_DEPTH;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, WorkspaceConfig::default());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.toml");
        let config = WorkspaceConfig {
            chunk_size: 32,
            max_depth: 12,
            audit_cadence: 9,
            graph: GraphDefaults {
                depth: 3,
                max_nodes: 10,
            },
        };
        config.save(&path).unwrap();
        assert_eq!(WorkspaceConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "chunk_size = 16\n").unwrap();
        let config = WorkspaceConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.graph, GraphDefaults::default());
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = WorkspaceConfig {
            chunk_size: 0,
            max_depth: 0,
            audit_cadence: 0,
            graph: GraphDefaults {
                depth: 0,
                max_nodes: 0,
            },
        }
        .sanitized();
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.audit_cadence, 1);
        assert_eq!(config.graph.max_nodes, 1);
        // depth 0 stays: a zero-ring query is a legal single-node view
        assert_eq!(config.graph.depth, 0);
    }

    #[test]
    fn test_excess_graph_depth_is_clamped() {
        let config = WorkspaceConfig {
            graph: GraphDefaults {
                depth: MAX_TRAVERSAL_DEPTH + 40,
                max_nodes: 8,
            },
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.graph.depth, MAX_TRAVERSAL_DEPTH);
    }
}
