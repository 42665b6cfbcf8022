use anyhow::{Context, bail};
use std::io::Read;
use std::path::Path;

pub type CliResult<T> = anyhow::Result<T>;

/// Splits a `name=value` command-line binding.
pub fn parse_binding(value: &str, what: &str) -> CliResult<(String, String)> {
    let Some((name, bound)) = value.split_once('=') else {
        bail!("invalid {what} binding {value:?}, expected NAME=VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid {what} binding {value:?}, name is empty");
    }
    Ok((name.to_string(), bound.to_string()))
}

pub fn parse_bindings(values: &[String], what: &str) -> CliResult<Vec<(String, String)>> {
    values.iter().map(|v| parse_binding(v, what)).collect()
}

/// Reads a file, or standard input for `-`.
pub fn read_source(path: &Path) -> CliResult<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().lock().read_to_string(&mut text).context("failed to read standard input")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("p=urn:p", ("p", "urn:p"))]
    #[case("x=a=b", ("x", "a=b"))]
    #[case(" n =", ("n", ""))]
    fn bindings_split_on_the_first_equals_sign(#[case] input: &str, #[case] expected: (&str, &str)) {
        let (name, value) = parse_binding(input, "variable").expect("valid binding");
        assert_eq!((name.as_str(), value.as_str()), expected);
    }

    #[rstest]
    #[case("novalue")]
    #[case("=value")]
    fn malformed_bindings_are_rejected(#[case] input: &str) {
        let err = parse_binding(input, "namespace").expect_err("invalid binding");
        assert!(err.to_string().contains("namespace"), "{err}");
    }

    #[test]
    fn missing_files_name_the_path() {
        let err = read_source(Path::new("/nonexistent/thicket.xml")).expect_err("missing");
        assert!(err.to_string().contains("thicket.xml"), "{err}");
    }
}
