//! Redis-style glob matching for key patterns.
//!
//! Supports `*` (any run of characters, including none), `?` (exactly one
//! character) and `\` escapes. This is the subset the cache uses for
//! `posts:*` invalidation; in-memory stores use it to mirror `SCAN MATCH`.

/// Whether `key` matches the glob `pattern`.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    // Position of the last `*` and the key index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                k += 1;
                continue;
            }
            Some('\\') if pattern.get(p + 1) == Some(&key[k]) => {
                p += 2;
                k += 1;
                continue;
            }
            Some(c) if *c != '\\' && *c == key[k] => {
                p += 1;
                k += 1;
                continue;
            }
            _ => {}
        }

        match backtrack {
            Some((star, tried)) => {
                p = star + 1;
                k = tried + 1;
                backtrack = Some((star, tried + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn prefix_patterns() {
        assert!(matches("posts:*", "posts:1:10"));
        assert!(matches("posts:*", "posts:"));
        assert!(!matches("posts:*", "post:abc"));
        assert!(!matches("posts:*", "xposts:1:10"));
    }

    #[test]
    fn single_character_wildcard() {
        assert!(matches("post:?", "post:a"));
        assert!(!matches("post:?", "post:ab"));
    }

    #[test]
    fn inner_stars_backtrack() {
        assert!(matches("posts:*:10", "posts:3:10"));
        assert!(!matches("posts:*:10", "posts:3:100"));
        assert!(matches("*:*", "a:b:c"));
    }

    #[test]
    fn escapes_are_literal() {
        assert!(matches("a\\*b", "a*b"));
        assert!(!matches("a\\*b", "axb"));
    }

    #[test]
    fn exact_keys() {
        assert!(matches("post:1", "post:1"));
        assert!(!matches("post:1", "post:12"));
    }
}
