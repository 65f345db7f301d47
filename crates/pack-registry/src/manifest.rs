use serde_json::Value;

/// Largest manifest the loader is willing to read.
pub(crate) const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Metadata declared by a pack's `pack.mcmeta`.
///
/// Fields are optional individually: a manifest with a valid `pack` object but
/// an unusable `pack_format` still contributes its description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackMeta {
    pub description: Option<String>,
    pub pack_format: Option<u32>,
}

/// Parse manifest bytes, returning `None` for anything that is not
/// `{"pack": {...}}`.
pub fn parse_manifest(bytes: &[u8]) -> Option<PackMeta> {
    let document: Value = serde_json::from_slice(strip_bom(bytes)).ok()?;
    let pack = document.get("pack")?.as_object()?;
    Some(PackMeta {
        description: pack.get("description").and_then(flatten_text),
        pack_format: pack.get("pack_format").and_then(as_format),
    })
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

fn as_format(value: &Value) -> Option<u32> {
    if let Some(int) = value.as_u64() {
        return u32::try_from(int).ok();
    }
    let float = value.as_f64()?;
    if float.is_finite() && float >= 0.0 && float <= u32::MAX as f64 {
        Some(float.trunc() as u32)
    } else {
        None
    }
}

/// Flatten a plain string or a text component (`{"text", "extra"}` or an array
/// of components) into its visible text.
fn flatten_text(value: &Value) -> Option<String> {
    let mut out = String::new();
    if collect_text(value, &mut out, 0) {
        Some(out)
    } else {
        None
    }
}

fn collect_text(value: &Value, out: &mut String, depth: usize) -> bool {
    if depth > 16 {
        return false;
    }
    match value {
        Value::String(text) => {
            out.push_str(text);
            true
        }
        Value::Array(parts) => {
            let mut any = false;
            for part in parts {
                any |= collect_text(part, out, depth + 1);
            }
            any
        }
        Value::Object(component) => {
            let mut any = false;
            if let Some(text) = component.get("text") {
                any |= collect_text(text, out, depth + 1);
            }
            if let Some(extra) = component.get("extra") {
                any |= collect_text(extra, out, depth + 1);
            }
            any
        }
        _ => false,
    }
}
