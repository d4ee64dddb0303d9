//! Device registry and login history behaviour.

mod common;

use common::{
    config, ctx, expect_session, new_account, setup, setup_with, FIREFOX_LINUX, SAFARI_IPHONE,
};
use proptest::prelude::*;
use sentinel_auth::constants::failure_reasons;
use sentinel_auth::devices::fingerprint;
use sentinel_auth::providers::{DeviceType, LoginStatus};
use sentinel_auth::utils::{is_valid_email, parse_user_agent, truncate_chars};
use sentinel_auth::{AuthError, DeviceId, RequestContext};
use std::net::{IpAddr, Ipv4Addr};

#[tokio::test]
async fn test_logins_from_two_devices() {
    let (auth, _env) = setup();
    let account = auth.register(new_account("ada@example.com", "ada"), &ctx(30)).await.unwrap();

    let phone = RequestContext::new(IpAddr::V4(Ipv4Addr::new(10, 9, 9, 9)), SAFARI_IPHONE);
    expect_session(auth.login("ada@example.com", "password123", &ctx(30)).await.unwrap());
    expect_session(auth.login("ada@example.com", "password123", &phone).await.unwrap());
    // Same browser from another network is the same device.
    expect_session(auth.login("ada@example.com", "password123", &ctx(31)).await.unwrap());

    let devices = auth.list_devices(account.id).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, fingerprint(FIREFOX_LINUX));
    assert_eq!(devices[0].ip_address.as_deref(), Some("10.0.0.31"));

    let iphone = devices.iter().find(|d| d.device_type == DeviceType::Mobile).unwrap();
    assert_eq!(iphone.os, "iOS");
    assert!(!iphone.is_trusted);
}

#[tokio::test]
async fn test_wrong_passwords_then_success_listed_newest_first() {
    let mut config = config();
    config.rate_limits = config.rate_limits.with_enabled(false);
    let (auth, _env) = setup_with(config);
    let account = auth.register(new_account("ada@example.com", "ada"), &ctx(40)).await.unwrap();

    for _ in 0..5 {
        assert_eq!(
            auth.login("ada@example.com", "wrong-password", &ctx(40)).await,
            Err(AuthError::InvalidCredentials)
        );
    }
    expect_session(auth.login("ada@example.com", "password123", &ctx(40)).await.unwrap());

    let history = auth.login_history(account.id, None, 0).await.unwrap();
    assert_eq!(history.len(), 6);
    assert_eq!(history[0].status, LoginStatus::Success);
    assert!(history[0].failure_reason.is_none());
    for attempt in &history[1..] {
        assert_eq!(attempt.status, LoginStatus::Failed);
        assert_eq!(attempt.failure_reason.as_deref(), Some(failure_reasons::WRONG_PASSWORD));
    }
    assert!(history.windows(2).all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn test_trust_and_remove_are_owner_scoped() {
    let (auth, _env) = setup();
    let ada = auth.register(new_account("ada@example.com", "ada"), &ctx(32)).await.unwrap();
    let bob = auth.register(new_account("bob@example.com", "bob"), &ctx(33)).await.unwrap();
    expect_session(auth.login("ada@example.com", "password123", &ctx(32)).await.unwrap());

    let device_id = fingerprint(FIREFOX_LINUX);
    assert_eq!(auth.trust_device(bob.id, &device_id, true).await, Err(AuthError::DeviceNotFound));
    assert_eq!(auth.remove_device(bob.id, &device_id).await, Err(AuthError::DeviceNotFound));

    assert!(auth.trust_device(ada.id, &device_id, true).await.unwrap().is_trusted);
    auth.remove_device(ada.id, &device_id).await.unwrap();
    assert!(auth.list_devices(ada.id).await.unwrap().is_empty());
    assert_eq!(
        auth.remove_device(ada.id, &DeviceId("missing".into())).await,
        Err(AuthError::DeviceNotFound)
    );
}

#[tokio::test]
async fn test_history_pagination_and_clamping() {
    let (auth, _env) = setup();
    let account = auth.register(new_account("ada@example.com", "ada"), &ctx(34)).await.unwrap();

    for octet in 40..44 {
        expect_session(auth.login("ada@example.com", "password123", &ctx(octet)).await.unwrap());
    }

    let page = auth.login_history(account.id, Some(2), 1).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].ip_address, "10.0.0.42");
    assert_eq!(page[1].ip_address, "10.0.0.41");

    assert_eq!(auth.login_history(account.id, Some(0), 0).await.unwrap().len(), 1);
    assert_eq!(auth.login_history(account.id, Some(10_000), 0).await.unwrap().len(), 4);
}

proptest! {
    #[test]
    fn fingerprint_is_stable_and_fixed_width(ua in ".{0,300}") {
        let a = fingerprint(&ua);
        prop_assert_eq!(a.as_str().len(), 32);
        prop_assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        prop_assert_eq!(a, fingerprint(&ua));
    }

    #[test]
    fn parse_user_agent_never_yields_empty_families(ua in ".{0,300}") {
        let parsed = parse_user_agent(&ua);
        prop_assert!(!parsed.browser.is_empty());
        prop_assert!(!parsed.os.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries(s in "\\PC{0,80}", max in 0usize..100) {
        let t = truncate_chars(&s, max);
        prop_assert!(t.chars().count() <= max);
        prop_assert!(s.starts_with(&t));
    }

    #[test]
    fn emails_without_at_are_rejected(local in "[a-z0-9.]{1,20}") {
        prop_assert!(!is_valid_email(&local));
    }
}
