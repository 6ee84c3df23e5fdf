//! Startup tests
//!
//! Configuration and key problems must stop the process before any
//! cycle touches the ledger.

use std::collections::HashMap;
use std::io::Write;

use piclaim_daemon::{ClaimService, DaemonError, SchedulePolicy};
use piclaim_settings::{keys, read_env_file, ScheduleMode, Settings, SettingsError};

const CLAIMANT: &str = "illness spike retreat truth genius clock brain pass fit cave bargain toe";
const SPONSOR: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const DESTINATION: &str = "GDRXE2BQUC3AZNPVFSCEZ76NJ3WWL25FYFK6RGZGIEKWE4SOOHSUJUJ6";

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn complete() -> HashMap<String, String> {
    env(&[
        (keys::CLAIMANT_PHRASE, CLAIMANT),
        (keys::SPONSOR_PHRASE, SPONSOR),
        (keys::DESTINATION_ADDRESS, DESTINATION),
    ])
}

fn load(vars: &HashMap<String, String>) -> Result<Settings, SettingsError> {
    Settings::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn test_missing_sponsor_phrase_is_named() {
    let mut vars = complete();
    vars.remove(keys::SPONSOR_PHRASE);

    let err = load(&vars).unwrap_err();
    assert!(matches!(err, SettingsError::Missing(keys::SPONSOR_PHRASE)));
    assert!(err.to_string().contains("SPONSOR_PHRASE"));
}

#[test]
fn test_each_required_key_is_checked() {
    for key in [keys::CLAIMANT_PHRASE, keys::SPONSOR_PHRASE, keys::DESTINATION_ADDRESS] {
        let mut vars = complete();
        vars.insert(key.to_string(), "   ".to_string());
        match load(&vars) {
            Err(SettingsError::Missing(missing)) => assert_eq!(missing, key),
            other => panic!("expected {} to be missing, got {:?}", key, other.map(|_| ())),
        }
    }
}

#[test]
fn test_legacy_key_names_accepted() {
    let vars = env(&[
        (keys::CLAIMANT_PHRASE_ALIAS, CLAIMANT),
        (keys::SPONSOR_PHRASE_ALIAS, SPONSOR),
        (keys::DESTINATION_ADDRESS_ALIAS, DESTINATION),
    ]);
    let settings = load(&vars).unwrap();
    assert_eq!(settings.destination.to_string(), DESTINATION);
}

#[test]
fn test_bad_destination_rejected() {
    let mut vars = complete();
    vars.insert(keys::DESTINATION_ADDRESS.to_string(), "GNOTANADDRESS".to_string());
    assert!(matches!(
        load(&vars),
        Err(SettingsError::Invalid {
            key: keys::DESTINATION_ADDRESS,
            ..
        })
    ));
}

#[test]
fn test_invalid_claimant_phrase_stops_service() {
    let mut vars = complete();
    vars.insert(
        keys::CLAIMANT_PHRASE.to_string(),
        "illness spike retreat truth genius clock brain pass fit cave bargain qwerty".to_string(),
    );
    let settings = load(&vars).unwrap();

    match ClaimService::from_settings(&settings) {
        Err(DaemonError::Key { account, .. }) => assert_eq!(account, "claimant"),
        Err(other) => panic!("expected key error, got {}", other),
        Ok(_) => panic!("service started with an invalid phrase"),
    }
}

#[test]
fn test_service_starts_with_defaults() {
    let settings = load(&complete()).unwrap();
    let service = ClaimService::from_settings(&settings).unwrap();

    assert_eq!(
        service.keys().claimant.address().to_string(),
        "GASWRHYE32A5A27TQWNRITIOZKOX7XQ6IVI4WEDGPVGX253D63UW2GJ3"
    );
    assert_eq!(
        service.keys().sponsor.address().to_string(),
        "GA2XRX65VZ4NRZG4FBQHREOR3Y2J3V55WW6KMUDCH64MFK2PBQB42JID"
    );
    assert_eq!(service.destination().to_string(), DESTINATION);
    assert_eq!(service.cycles(), 0);
}

#[test]
fn test_policy_file_and_env_overrides() {
    let path = std::env::temp_dir().join(format!("piclaim-startup-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"{{ "cycle_delay_ms": 250, "schedule": "backoff", "fee_multiplier": 3 }}"#
    )
    .unwrap();

    let mut vars = complete();
    vars.insert(keys::SETTINGS_FILE.to_string(), path.display().to_string());
    vars.insert(keys::FEE_MULTIPLIER.to_string(), "5".to_string());

    let settings = load(&vars).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(settings.policy.schedule, ScheduleMode::Backoff);
    assert_eq!(settings.policy.fee_multiplier, 5);
    assert!(matches!(
        SchedulePolicy::from_settings(&settings.policy),
        SchedulePolicy::Backoff { initial, .. } if initial.as_millis() == 250
    ));
}

#[test]
fn test_env_file_with_legacy_names_starts_service() {
    let path = std::env::temp_dir().join(format!("piclaim-startup-{}.env", std::process::id()));
    std::fs::write(
        &path,
        format!(
            "MNEMONIC=\"{}\"\nSPONSOR_MNEMONIC=\"{}\"\nRECEIVER_ADDRESS={}\n",
            CLAIMANT, SPONSOR, DESTINATION
        ),
    )
    .unwrap();
    let file = read_env_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    // Nothing in the environment; the file alone satisfies the required keys
    assert!(matches!(
        Settings::from_lookup(|_| None),
        Err(SettingsError::Missing(keys::CLAIMANT_PHRASE))
    ));
    let settings = Settings::from_lookup_with_file(|_| None, &file).unwrap();
    let service = ClaimService::from_settings(&settings).unwrap();
    assert_eq!(service.destination().to_string(), DESTINATION);
}
