//! Username/password similarity

/// Levenshtein edit distance with unit costs, two-row DP
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / max(len)` in `0.0..=1.0`; two empty strings are identical
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Case-insensitive check: containment either way, or similarity above
/// `threshold`
pub fn too_similar(username: &str, password: &str, threshold: f64) -> bool {
    let user = username.to_lowercase();
    let pass = password.to_lowercase();
    if user.is_empty() || pass.is_empty() {
        return false;
    }
    user.contains(&pass) || pass.contains(&user) || similarity(&user, &pass) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("kitten", "sitting", 3)]
    #[case("", "abc", 3)]
    #[case("flaw", "lawn", 2)]
    #[case("same", "same", 0)]
    #[case("ünï", "uni", 2)]
    fn edit_distance(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
        assert_eq!(levenshtein(b, a), expected);
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert!((similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn containment_is_too_similar() {
        assert!(too_similar("proj_alpha_user", "xPROJ_ALPHA_USER!9", 0.8));
        assert!(too_similar("admin", "admin", 0.8));
    }

    #[test]
    fn near_miss_is_too_similar() {
        // one substitution in ten characters
        assert!(too_similar("dbuser2024", "dbuser2025", 0.8));
    }

    #[test]
    fn unrelated_pair_passes() {
        assert!(!too_similar("proj_alpha_user", "Xk9#mP2$vL7@qR4!", 0.8));
    }
}
