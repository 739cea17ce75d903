//! 청크 ID 생성
//!
//! `(소스 식별자, 위치)`에서 결정적으로 UUID v5를 만듭니다.
//! 같은 입력은 항상 같은 ID가 되어 upsert가 멱등으로 동작합니다.

use uuid::Uuid;

/// 청크 ID 네임스페이스 (고정값, 변경 시 모든 ID가 바뀜)
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0xf2a86e07_5f3f_4b06_bb31_78f5f7cc5a63);

/// 청크 ID 생성
///
/// `"{source}::chunk::{position}"`을 UUID v5로 해싱합니다.
pub fn derive_chunk_id(source: &str, position: usize) -> String {
    let name = format!("{}::chunk::{}", source, position);
    Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(
            derive_chunk_id("guides/setup.md", 0),
            derive_chunk_id("guides/setup.md", 0)
        );
    }

    #[test]
    fn test_distinct_positions_and_sources() {
        let a0 = derive_chunk_id("a.md", 0);
        let a1 = derive_chunk_id("a.md", 1);
        let b0 = derive_chunk_id("b.md", 0);
        assert_ne!(a0, a1);
        assert_ne!(a0, b0);
    }

    #[test]
    fn test_uuid_v5_format() {
        let id = derive_chunk_id("a.md", 3);
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 5);
    }

    #[test]
    fn test_separator_prevents_ambiguity() {
        // "a::chunk::1" + 0 과 "a" + 1 은 다른 이름
        assert_ne!(derive_chunk_id("a::chunk::1", 0), derive_chunk_id("a", 1));
    }
}
