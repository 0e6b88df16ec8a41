//! Render a binary as a C byte-array source fragment for firmware embedding.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::EmitConfig;
use crate::error::{IoResultExt, Result, SporeError};

/// Whether `symbol` is a valid C identifier.
pub fn is_valid_symbol(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Render `binary` as a C source fragment.
///
/// ```text
/// // Model size: 3 bytes
/// const unsigned char model[] = {
///   0x1c, 0x00, 0x00,
/// };
/// const int model_len = 3;
/// ```
///
/// Bytes are written as lowercase `0x%02x` literals, 16 per line.
pub fn emit_as_source(binary: &[u8], symbol: &str) -> String {
    let mut out = String::with_capacity(binary.len() * 6 + 128);

    let _ = writeln!(out, "// Model size: {} bytes", binary.len());
    let _ = writeln!(out, "const unsigned char {symbol}[] = {{");
    for row in binary.chunks(EmitConfig::BYTES_PER_LINE) {
        out.push_str(EmitConfig::INDENT);
        let literals: Vec<String> = row.iter().map(|byte| format!("0x{byte:02x}")).collect();
        out.push_str(&literals.join(", "));
        out.push_str(",\n");
    }
    out.push_str("};\n");
    let _ = writeln!(out, "const int {symbol}_len = {};", binary.len());
    out
}

/// Render `binary` as a standalone header with include guards.
pub fn emit_header(binary: &[u8], symbol: &str) -> String {
    let guard = format!("{}_H", symbol.to_ascii_uppercase());
    let mut out = String::new();
    out.push_str("// Auto-generated model data for SporeNet firmware\n");
    let _ = writeln!(out, "#ifndef {guard}");
    let _ = writeln!(out, "#define {guard}\n");
    out.push_str("#include <stdint.h>\n\n");
    let _ = writeln!(out, "extern const unsigned char {symbol}[];");
    let _ = writeln!(out, "extern const int {symbol}_len;\n");
    out.push_str(&emit_as_source(binary, symbol));
    let _ = writeln!(out, "\n#endif // {guard}");
    out
}

/// Write a header for `binary` next to `output_path` (same stem, `.h`).
///
/// Returns the path of the written header.
pub fn write_header_beside(output_path: &Path, binary: &[u8], symbol: &str) -> Result<PathBuf> {
    if !is_valid_symbol(symbol) {
        return Err(SporeError::Other(format!(
            "'{symbol}' is not a valid C identifier"
        )));
    }
    let header_path = output_path.with_extension("h");
    std::fs::write(&header_path, emit_header(binary, symbol)).with_path(&header_path)?;
    info!(
        "Generated C header {} ({} bytes of model data)",
        header_path.display(),
        binary.len()
    );
    Ok(header_path)
}

/// Recover the bytes from a fragment produced by [`emit_as_source`].
///
/// If the fragment declares a `_len` constant, it must match the number of
/// literals found.
pub fn parse_source_bytes(source: &str) -> Result<Vec<u8>> {
    let open = source
        .find("[] = {")
        .ok_or_else(|| SporeError::artifact_invalid("no byte array initializer found"))?;
    let body_start = open + "[] = {".len();
    let body_len = source[body_start..]
        .find("};")
        .ok_or_else(|| SporeError::artifact_invalid("byte array initializer is not closed"))?;
    let body = &source[body_start..body_start + body_len];

    let bytes = body
        .split(',')
        .map(str::trim)
        .filter(|literal| !literal.is_empty())
        .map(|literal| {
            literal
                .strip_prefix("0x")
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    SporeError::artifact_invalid(format!("malformed byte literal '{literal}'"))
                })
        })
        .collect::<Result<Vec<u8>>>()?;

    if let Some(declared) = declared_len(&source[body_start + body_len..]) {
        if declared != bytes.len() {
            return Err(SporeError::artifact_invalid(format!(
                "declared length {declared} does not match {} byte literals",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}

fn declared_len(rest: &str) -> Option<usize> {
    let start = rest.find("_len = ")? + "_len = ".len();
    let end = rest[start..].find(';')?;
    rest[start..start + end].trim().parse().ok()
}
