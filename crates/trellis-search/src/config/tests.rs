use super::*;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.port, 3004);
    assert_eq!(config.graph_dialect, GraphDialect::Cypher);
    assert_eq!(config.pool_size, 10);
    assert_eq!(config.result_ttl_secs, 300);
    assert_eq!(config.l1_result_capacity, 1_000);
    assert_eq!(config.l1_embedding_capacity, 10_000);
    assert!(!config.allow_unscoped_queries);
    assert!(config.cache_url.is_none());
}

#[test]
fn test_socket_addr_format() {
    let config = Config::default();
    assert_eq!(config.socket_addr(), "127.0.0.1:3004");
}

#[test]
fn test_dialect_parse() {
    assert_eq!(
        GraphDialect::parse("cypher").unwrap(),
        GraphDialect::Cypher
    );
    assert_eq!(
        GraphDialect::parse("FalkorDB").unwrap(),
        GraphDialect::RedisGraph
    );
    assert_eq!(
        GraphDialect::parse("redisgraph").unwrap(),
        GraphDialect::RedisGraph
    );
    assert!(GraphDialect::parse("sparql").is_err());
}

#[test]
fn test_validate_rejects_zero_dimension() {
    let config = Config {
        embedding_dim: 0,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_zero_pool() {
    let config = Config {
        pool_size: 0,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_accepts_defaults() {
    assert!(Config::default().validate().is_ok());
}
