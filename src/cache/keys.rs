/// 限流记录键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 生成限流记录键，每个 (操作, 客户端) 组合一条
pub fn rate_limit_key(action: &str, client_id: &str) -> String {
    format!("{}{}:{}", RATE_LIMIT_PREFIX, action, client_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_separates_action_and_client() {
        assert_eq!(
            rate_limit_key("add", "203.0.113.7"),
            "rate_limit:add:203.0.113.7"
        );
        assert_ne!(
            rate_limit_key("add", "203.0.113.7"),
            rate_limit_key("delete", "203.0.113.7")
        );
    }
}
