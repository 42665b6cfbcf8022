use rstest::rstest;
use std::io::Write;
use std::process::{Command, Stdio};

fn thicket() -> Command {
    Command::new(env!("CARGO_BIN_EXE_thicket"))
}

#[rstest]
#[case(&["parse", "1 + 2"], "(+ 1 2)")]
#[case(&["query", "string-join((1 to 3) ! string(), ',')"], "1,2,3")]
#[case(&["query", "--xpath-version", "1.0", "1 div 0"], "INF")]
fn prints_results_on_stdout(#[case] args: &[&str], #[case] expected: &str) {
    let output = thicket().args(args).output().expect("spawn");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim_end(), expected);
}

#[test]
fn reads_the_document_from_stdin() {
    let mut child = thicket()
        .args(["query", "count(//b)", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn");
    child.stdin.take().expect("stdin").write_all(b"<a><b/><b/></a>").expect("write");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim_end(), "2");
}

#[test]
fn failures_exit_with_an_error_status() {
    let output = thicket().args(["query", "error()"]).output().expect("spawn");
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("FOER0000"));
}

#[test]
fn documents_resolve_by_path() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "<r><x>1</x><x>2</x></r>").expect("write");
    let path = file.path().display().to_string();
    let binding = format!("p={path}");
    let output = thicket()
        .args(["query", "sum(//x) + count(doc($p)//x)", path.as_str(), "--var", binding.as_str()])
        .output()
        .expect("spawn");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim_end(), "5");
}
