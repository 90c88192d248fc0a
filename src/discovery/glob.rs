//! Path glob matching
//!
//! Supports the subset of shell globbing used by test roots:
//! - `*` matches zero or more characters within one path segment
//! - `?` matches exactly one character other than `/`
//! - `**/` at the start of a segment matches zero or more whole directories
//! - `**` anywhere else behaves like `*`

/// Match a relative path against a glob pattern.
///
/// Returns true if the pattern matches the entire path.
pub fn path_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let path: Vec<char> = path.chars().collect();
    match_from(&pattern, 0, &path, 0)
}

/// Literal directory prefix of a pattern, up to the last `/` before the first wildcard
pub fn literal_dir(pattern: &str) -> &str {
    let wildcard = pattern.find(['*', '?']).unwrap_or(pattern.len());
    match pattern[..wildcard].rfind('/') {
        Some(slash) => &pattern[..slash],
        None => "",
    }
}

fn match_from(pattern: &[char], pi: usize, path: &[char], ii: usize) -> bool {
    if pi >= pattern.len() {
        return ii >= path.len();
    }

    match pattern[pi] {
        '*' if is_recursive(pattern, pi) => {
            let rest = pi + 3;
            if match_from(pattern, rest, path, ii) {
                return true;
            }
            (ii..path.len())
                .filter(|&j| path[j] == '/')
                .any(|j| match_from(pattern, rest, path, j + 1))
        }
        '*' => {
            let mut rest = pi + 1;
            while rest < pattern.len() && pattern[rest] == '*' {
                rest += 1;
            }
            let mut j = ii;
            loop {
                if match_from(pattern, rest, path, j) {
                    return true;
                }
                if j >= path.len() || path[j] == '/' {
                    return false;
                }
                j += 1;
            }
        }
        '?' => ii < path.len() && path[ii] != '/' && match_from(pattern, pi + 1, path, ii + 1),
        c => ii < path.len() && path[ii] == c && match_from(pattern, pi + 1, path, ii + 1),
    }
}

/// `**/` spanning a whole segment
fn is_recursive(pattern: &[char], pi: usize) -> bool {
    let at_segment_start = pi == 0 || pattern[pi - 1] == '/';
    at_segment_start
        && pattern.get(pi + 1) == Some(&'*')
        && pattern.get(pi + 2) == Some(&'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(path_match("a/b.rb", "a/b.rb"));
        assert!(!path_match("a/b.rb", "a/c.rb"));
        assert!(!path_match("a/b.rb", "a/b.rbx"));
    }

    #[test]
    fn test_star_stays_in_segment() {
        assert!(path_match("*_test.rb", "x_test.rb"));
        assert!(!path_match("*_test.rb", "dir/x_test.rb"));
        assert!(path_match("*/x.rb", "dir/x.rb"));
        assert!(!path_match("*/x.rb", "a/b/x.rb"));
    }

    #[test]
    fn test_question_mark() {
        assert!(path_match("x?.rb", "x1.rb"));
        assert!(!path_match("x?.rb", "x/.rb"));
    }

    #[test]
    fn test_recursive() {
        assert!(path_match("**/*_test.rb", "x_test.rb"));
        assert!(path_match("**/*_test.rb", "a/b/c/x_test.rb"));
        assert!(path_match("test/**/**/*_test.rb", "test/x_test.rb"));
        assert!(path_match("test/**/**/*_test.rb", "test/unit/models/x_test.rb"));
        assert!(!path_match("test/**/*_test.rb", "spec/x_test.rb"));
    }

    #[test]
    fn test_double_star_inside_segment_is_single() {
        assert!(path_match("sub1**/*_test.rb", "sub1/x_test.rb"));
        assert!(path_match("sub1**/*_test.rb", "sub10/x_test.rb"));
        assert!(!path_match("sub1**/*_test.rb", "sub1/sub2/x_test.rb"));
    }

    #[test]
    fn test_literal_dir() {
        assert_eq!(literal_dir("test/unit/**/*_test.rb"), "test/unit");
        assert_eq!(literal_dir("**/*_test.rb"), "");
        assert_eq!(literal_dir("sub1**/*_test.rb"), "");
        assert_eq!(literal_dir("*/sub2**/*_test.rb"), "");
        assert_eq!(literal_dir("test/a_test.rb"), "test");
    }
}
