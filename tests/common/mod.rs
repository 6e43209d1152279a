use station_stream::config::{Config, KafkaConfig, ProvisioningConfig, StreamConfig};
use std::env;

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string()),
        schema_registry_url: env::var("TEST_SCHEMA_REGISTRY_URL")
            .unwrap_or_else(|_| "http://localhost:8081".to_string()),
        compression: "none".to_string(), // No compression for tests
        acks: "all".to_string(),
        linger_ms: 0,  // Immediate sending for tests
        batch_size: 1, // Small batches for tests
        message_timeout_ms: 10_000,
        flush_timeout_secs: 10,
        registry_timeout_secs: 5,
    };

    let provisioning = ProvisioningConfig {
        max_attempts: Some(5), // Fail fast when no broker is running
        initial_backoff_ms: 200,
        ..ProvisioningConfig::default()
    };

    let stream = StreamConfig {
        input_topic: format!("test_{}.stations", std::process::id()),
        output_topic: format!("test_{}.transformed.stations", std::process::id()),
        group_id: format!("test_group_{}", std::process::id()),
        ..StreamConfig::default()
    };

    Config {
        kafka,
        provisioning,
        stream,
    }
}
