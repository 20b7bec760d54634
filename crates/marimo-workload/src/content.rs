//! Inline notebook content: ConfigMap generation, file type sniffing, fingerprints

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use sha2::{Digest, Sha256};

use crate::NotebookMeta;

/// Volume name for the mounted content ConfigMap
pub const CONTENT_VOLUME_NAME: &str = "notebook-content";

/// Mount path of the content ConfigMap inside the copy init container
pub const CONTENT_MOUNT_PATH: &str = "/content";

/// The single key holding notebook text in the content ConfigMap
pub const CONTENT_KEY: &str = "notebook.py";

const PYTHON_FILE: &str = "notebook.py";
const MARKDOWN_FILE: &str = "notebook.md";

/// Name of the content ConfigMap for a notebook
pub fn config_map_name(notebook_name: &str) -> String {
    format!("{notebook_name}-content")
}

/// Build the content ConfigMap
pub fn compile_config_map(meta: &NotebookMeta<'_>, content: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta.object_meta(config_map_name(meta.name)),
        data: Some(BTreeMap::from([(
            CONTENT_KEY.to_string(),
            content.to_string(),
        )])),
        ..Default::default()
    }
}

/// Filename the notebook is copied to, chosen by sniffing the content.
///
/// Leading `---` frontmatter means marimo markdown; everything else,
/// including `@app.cell` / `import marimo` sources, is a `.py` notebook.
pub fn detect_content_file(content: &str) -> &'static str {
    if content.trim_start().starts_with("---") {
        MARKDOWN_FILE
    } else {
        PYTHON_FILE
    }
}

fn sha256_hex(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// `sha256:` followed by the first 16 hex characters of the content digest
pub fn content_hash(content: &str) -> String {
    let hex = sha256_hex(content);
    format!("sha256:{}", &hex[..16])
}

/// First 12 hex characters of the source URL digest
pub fn source_hash(source: &str) -> String {
    let mut hex = sha256_hex(source);
    hex.truncate(12);
    hex
}
