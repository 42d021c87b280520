use crate::config::{ForecastConfig, SequenceProfile};
use std::env;
use std::sync::Mutex;
use std::sync::OnceLock;

// Global lock to prevent race conditions when modifying environment variables in tests
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

fn set(key: &str, value: &str) {
    // SAFETY: every test touching the environment holds ENV_LOCK.
    unsafe { env::set_var(key, value) };
}

fn clear(key: &str) {
    // SAFETY: every test touching the environment holds ENV_LOCK.
    unsafe { env::remove_var(key) };
}

#[test]
fn test_config_defaults_from_env() {
    let _guard = get_env_lock().lock().unwrap();

    let config = ForecastConfig::from_env().unwrap();

    assert_eq!(config.pipeline.sequence_length, 10);
    assert_eq!(config.sequence.epochs, 50);
    assert_eq!(config.sequence.profile, SequenceProfile::Wide);
    assert_eq!(config.tree.early_stopping_rounds, Some(10));
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_env_overrides() {
    let _guard = get_env_lock().lock().unwrap();
    set("FORECAST_SEQUENCE_LENGTH", "15");
    set("LSTM_PROFILE", "compact");
    set("LSTM_EPOCHS", "5");
    set("XGB_N_ESTIMATORS", "300");
    set("XGB_EARLY_STOPPING_ROUNDS", "0");
    set("FORECAST_CV_MAX_TRAIN_SIZE", "120");

    let config = ForecastConfig::from_env().unwrap();

    assert_eq!(config.pipeline.sequence_length, 15);
    assert_eq!(config.pipeline.cv_max_train_size, Some(120));
    assert_eq!(config.sequence.profile, SequenceProfile::Compact);
    assert_eq!(config.sequence.epochs, 5);
    assert_eq!(config.tree.n_estimators, 300);
    assert_eq!(config.tree.early_stopping_rounds, None);

    // Cleanup
    clear("FORECAST_SEQUENCE_LENGTH");
    clear("LSTM_PROFILE");
    clear("LSTM_EPOCHS");
    clear("XGB_N_ESTIMATORS");
    clear("XGB_EARLY_STOPPING_ROUNDS");
    clear("FORECAST_CV_MAX_TRAIN_SIZE");
}

#[test]
fn test_config_rejects_unparseable_values() {
    let _guard = get_env_lock().lock().unwrap();
    set("LSTM_BATCH_SIZE", "thirty-two");

    let result = ForecastConfig::from_env();
    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("LSTM_BATCH_SIZE"));

    clear("LSTM_BATCH_SIZE");
}

#[test]
fn test_config_zero_sequence_length_is_invalid() {
    let _guard = get_env_lock().lock().unwrap();
    set("FORECAST_SEQUENCE_LENGTH", "0");

    let config = ForecastConfig::from_env().unwrap();
    assert!(config.validate().is_err());

    clear("FORECAST_SEQUENCE_LENGTH");
}
