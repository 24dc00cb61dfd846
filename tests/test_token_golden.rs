//! Known-answer tests for SAS token generation
//!
//! The expected tokens were computed independently with HMAC-SHA256 over
//! `<resource>\n<expiry>`; any change here breaks authentication with real
//! hubs.

mod test_helpers;

use telemetry_link::credential::{
    build_token, decode_base64, percent_encode, resource_uri, CredentialError, CredentialManager,
};
use test_helpers::{REALISTIC_KEY, START_EPOCH};

#[test]
fn test_zero_key_golden_token() {
    let token = build_token("h", "d", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=", 1000).unwrap();
    assert_eq!(
        token,
        "SharedAccessSignature sr=h/devices/d&sig=D0Vxj%2FjzQ1jYTaRxNdJEqO9Dp1sbAuO1LQ4sQfTdu40%3D&se=1000"
    );
}

#[test]
fn test_realistic_hub_token() {
    let token = build_token("myhub.azure-devices.net", "dev-01", REALISTIC_KEY, 1_700_086_400).unwrap();
    assert_eq!(
        token,
        "SharedAccessSignature sr=myhub.azure-devices.net/devices/dev-01\
         &sig=w7Gc2zoZScr7AtxJWn6PH%2F%2FKnsotbQUr5O3KH98zrl4%3D&se=1700086400"
    );
}

#[test]
fn test_resource_uri_is_not_encoded() {
    assert_eq!(
        resource_uri("myhub.azure-devices.net", "dev-01"),
        "myhub.azure-devices.net/devices/dev-01"
    );
}

#[test]
fn test_percent_encoding_rules() {
    assert_eq!(percent_encode(b"abcXYZ019"), "abcXYZ019");
    assert_eq!(percent_encode(b"a b"), "a+b");
    assert_eq!(percent_encode(b"+/="), "%2B%2F%3D");
    assert_eq!(percent_encode(&[0x00, 0xff]), "%00%FF");
    assert_eq!(percent_encode(b""), "");
}

#[test]
fn test_invalid_key_is_an_encoding_error() {
    assert!(matches!(decode_base64("@@@@"), Err(CredentialError::Encoding(_))));
    assert!(matches!(
        build_token("h", "d", "not base64!", 1000),
        Err(CredentialError::Encoding(_))
    ));
}

#[test]
fn test_manager_token_matches_signer() {
    let mut manager = CredentialManager::new(86_400, 0);
    let credential = manager
        .ensure_valid(START_EPOCH, "myhub.azure-devices.net", "dev-01", REALISTIC_KEY)
        .unwrap()
        .clone();

    assert_eq!(credential.expiry_epoch, START_EPOCH + 86_400);
    assert_eq!(
        credential.token,
        build_token(
            "myhub.azure-devices.net",
            "dev-01",
            REALISTIC_KEY,
            START_EPOCH + 86_400
        )
        .unwrap()
    );
    assert_eq!(
        credential.token,
        "SharedAccessSignature sr=myhub.azure-devices.net/devices/dev-01\
         &sig=w7Gc2zoZScr7AtxJWn6PH%2F%2FKnsotbQUr5O3KH98zrl4%3D&se=1700086400"
    );
}
