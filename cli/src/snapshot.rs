//! Store snapshots: multi-document YAML files standing in for a cluster.

use std::path::Path;

use anyhow::{bail, Context, Result};
use maas_operator_core::infrastructure::memory::MemoryStore;
use maas_operator_core::render::split_documents;
use maas_operator_core::types::object::DynamicObject;

/// Parse every document of `text` into an object. Empty documents are skipped.
pub fn parse(text: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for (index, doc) in split_documents(text).iter().enumerate() {
        let value: serde_json::Value =
            serde_yaml::from_str(doc).with_context(|| format!("document {} is not valid YAML", index))?;
        if value.is_null() {
            continue;
        }
        match DynamicObject::from_value(value) {
            Ok(object) => objects.push(object),
            Err(reason) => bail!("document {}: {}", index, reason),
        }
    }
    Ok(objects)
}

/// Load a snapshot file into a fresh store.
pub fn load(path: &Path) -> Result<MemoryStore> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read state file {}", path.display()))?;
    let objects = parse(&text).with_context(|| format!("invalid state file {}", path.display()))?;
    Ok(MemoryStore::with_objects(objects))
}

/// Render objects as one multi-document YAML stream.
pub fn dump(objects: &[DynamicObject]) -> Result<String> {
    let mut out = String::new();
    for object in objects {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(object).context("cannot serialize object")?);
    }
    Ok(out)
}

/// Write to `path`, or stdout when no path is given.
pub fn emit(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}
