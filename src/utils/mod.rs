pub mod ip;
pub mod url_validator;

/// 随机链接 ID（CLI 未指定时使用）
pub fn generate_random_code(length: usize) -> String {
    use std::iter;

    let chars = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    iter::repeat_with(|| chars[rand::random_range(0..chars.len())] as char)
        .take(length)
        .collect()
}

/// 链接 ID：1-128 个字母、数字、`-`、`_`、`.`
pub fn is_valid_link_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 128
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_random_code() {
        let code = generate_random_code(8);
        assert_eq!(code.len(), 8);
        assert!(is_valid_link_code(&code));
    }

    #[test]
    fn test_is_valid_link_code() {
        assert!(is_valid_link_code("spring-promo_2026.v2"));
        assert!(!is_valid_link_code(""));
        assert!(!is_valid_link_code("a/b"));
        assert!(!is_valid_link_code("favicon ico"));
        assert!(!is_valid_link_code(&"x".repeat(129)));
    }
}
