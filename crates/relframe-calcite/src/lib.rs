//! DataFrame algebra → Calcite relational algebra
//!
//! Compiles a logical [`Frame`] tree into a flat, id-addressed [`Plan`] of
//! physical nodes and serializes it into the JSON request understood by the
//! query engine.

use std::sync::Arc;

use relframe_ir::Frame;
use sha2::{Digest, Sha256};

pub mod algebra;
pub mod builder;
pub mod context;
mod error;
pub mod predicate;
pub mod serializer;

pub use algebra::{Collation, NodeId, Plan, RelNode};
pub use builder::{BuildOptions, CalciteBuilder};
pub use context::{CompiledInput, InputContext};
pub use error::CompileError;
pub use serializer::{CalciteSerializer, UNSET_SCALE};

/// Compile `root` into physical nodes
pub fn compile(root: &Arc<Frame>, options: &BuildOptions) -> Result<Plan, CompileError> {
    CalciteBuilder::new(options.clone()).build(root)
}

/// Compile `root` and serialize the resulting plan
pub fn to_json(root: &Arc<Frame>, options: &BuildOptions) -> Result<serde_json::Value, CompileError> {
    let plan = compile(root, options)?;
    CalciteSerializer.serialize(&plan)
}

/// Serialized request text, as sent to the engine
pub fn to_request(root: &Arc<Frame>, options: &BuildOptions) -> Result<String, CompileError> {
    let json = to_json(root, options)?;
    serde_json::to_string(&json).map_err(|e| CompileError::Serialization(e.to_string()))
}

/// Stable SHA-256 of a serialized request
pub fn fingerprint(request: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint("{\"rels\":[]}");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fingerprint("{\"rels\":[]}"));
        assert_ne!(fp, fingerprint("{\"rels\":[{}]}"));
    }
}
