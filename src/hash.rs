use xxhash_rust::xxh3::xxh3_64;

/// 字符串 → u64 摘要
///
/// 使用 xxh3，不带随机种子，进程重启后结果不变，
/// 一致性哈希环的位置和取模下标因此可以复现。
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(hash_str("192.168.0.1"), hash_str("192.168.0.1"));
        assert_ne!(hash_str("192.168.0.1"), hash_str("192.168.0.2"));
    }

    #[test]
    fn test_matches_xxh3() {
        assert_eq!(hash_str(""), xxh3_64(b""));
        assert_eq!(hash_str("node-0"), xxh3_64(b"node-0"));
    }
}
