/// Checks produced output against the expected answer.
///
/// Carriage returns are ignored. Lines are compared up to the longer of
/// the two line counts and a line missing on one side only matches a
/// blank line on the other. Inside a line, whitespace-delimited tokens
/// must be equal, so extra spaces or tabs around and between tokens and
/// trailing blank lines never cause a mismatch.
pub fn outputs_match(output: &str, expected: &str) -> bool {
    let output = output.replace('\r', "");
    let expected = expected.replace('\r', "");

    let output_lines: Vec<&str> = output.split('\n').collect();
    let expected_lines: Vec<&str> = expected.split('\n').collect();

    (0..output_lines.len().max(expected_lines.len())).all(|i| {
        match (output_lines.get(i), expected_lines.get(i)) {
            (Some(a), Some(b)) => lines_match(a, b),
            (Some(line), None) | (None, Some(line)) => is_blank(line),
            (None, None) => true,
        }
    })
}

fn lines_match(output: &str, expected: &str) -> bool {
    output.split_whitespace().eq(expected.split_whitespace())
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
