// ABOUTME: Integration tests for the firewall reconciler against an in-memory rule table.
// ABOUTME: Convergence from messy tables, lockout protection, locking, and idempotence properties.

mod support;

use nonempty::NonEmpty;
use proptest::prelude::*;
use safeship::firewall::{
    FIREWALL_LOCK, FirewallError, FirewallErrorKind, LockoutGuard, PacketFilter, RuleAction,
    SourceScope, reconcile, reconcile_locked, session_address_from_env,
};
use safeship::lock::HostLock;
use safeship::types::Protocol;
use std::net::IpAddr;
use support::{MemoryPacketFilter, StoredRule};

const PORT: u16 = 5601;
const TCP: Protocol = Protocol::Tcp;

fn addr(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn allow_list(addrs: &[&str]) -> NonEmpty<IpAddr> {
    NonEmpty::from_vec(addrs.iter().map(|a| addr(a)).collect()).unwrap()
}

/// Rules governing PORT/TCP, as (source, action, protocol) in table order.
async fn governing(filter: &MemoryPacketFilter) -> Vec<(SourceScope, RuleAction, Option<Protocol>)> {
    filter
        .rules()
        .await
        .unwrap()
        .governing(PORT, TCP)
        .into_iter()
        .map(|r| (r.source.clone(), r.action, r.protocol))
        .collect()
}

fn exact(addrs: &[&str]) -> Vec<(SourceScope, RuleAction, Option<Protocol>)> {
    addrs
        .iter()
        .map(|a| (SourceScope::Address(addr(a)), RuleAction::Allow, Some(TCP)))
        .collect()
}

#[tokio::test]
async fn removes_anywhere_rules_in_both_families() {
    let filter = MemoryPacketFilter::with_rules(vec![
        StoredRule::any(22, Some(TCP)),
        StoredRule::any(PORT, Some(TCP)),
        StoredRule::allow(80, TCP, "203.0.113.10"),
        StoredRule::any(PORT, None),
        StoredRule::any(PORT, Some(TCP)),
    ]);
    let allow = allow_list(&["203.0.113.10"]);

    let report = reconcile(&filter, PORT, TCP, &allow, &LockoutGuard::default())
        .await
        .unwrap();

    assert_eq!(report.removed.len(), 3);
    assert_eq!(report.added, vec![addr("203.0.113.10")]);
    assert!(report.is_compliant());
    assert!(!report.any_scope_remaining);
    assert_eq!(governing(&filter).await, exact(&["203.0.113.10"]));

    // Unrelated ports untouched.
    let rules = filter.snapshot();
    assert!(rules.contains(&StoredRule::any(22, Some(TCP))));
    assert!(rules.contains(&StoredRule::allow(80, TCP, "203.0.113.10")));
}

#[tokio::test]
async fn removes_strays_duplicates_and_denies() {
    let filter = MemoryPacketFilter::with_rules(vec![
        StoredRule::allow(PORT, TCP, "198.51.100.7"),
        StoredRule::allow(PORT, TCP, "203.0.113.10"),
        StoredRule::allow(PORT, TCP, "203.0.113.10"),
        StoredRule {
            port: PORT,
            protocol: Some(TCP),
            action: RuleAction::Deny,
            source: SourceScope::Address(addr("2001:db8::1")),
        },
        StoredRule {
            port: PORT,
            protocol: Some(TCP),
            action: RuleAction::Allow,
            source: SourceScope::Other("10.0.0.0/8".to_string()),
        },
    ]);
    let allow = allow_list(&["203.0.113.10", "2001:db8::1"]);

    let report = reconcile(&filter, PORT, TCP, &allow, &LockoutGuard::default())
        .await
        .unwrap();

    assert_eq!(report.removed.len(), 4);
    assert_eq!(report.added, vec![addr("2001:db8::1")]);
    assert!(report.addresses.iter().all(|a| a.rules == 1));
    assert_eq!(governing(&filter).await, exact(&["203.0.113.10", "2001:db8::1"]));
}

#[tokio::test]
async fn protocol_less_allow_is_replaced_by_exact_rule() {
    let filter = MemoryPacketFilter::with_rules(vec![StoredRule {
        port: PORT,
        protocol: None,
        action: RuleAction::Allow,
        source: SourceScope::Address(addr("203.0.113.10")),
    }]);
    let allow = allow_list(&["203.0.113.10"]);

    let report = reconcile(&filter, PORT, TCP, &allow, &LockoutGuard::default())
        .await
        .unwrap();

    assert_eq!(report.removed.len(), 1);
    assert_eq!(governing(&filter).await, exact(&["203.0.113.10"]));
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let filter = MemoryPacketFilter::with_rules(vec![
        StoredRule::any(PORT, Some(TCP)),
        StoredRule::allow(PORT, TCP, "198.51.100.7"),
    ]);
    let allow = allow_list(&["203.0.113.10", "203.0.113.11"]);
    let guard = LockoutGuard::default();

    let first = reconcile(&filter, PORT, TCP, &allow, &guard).await.unwrap();
    assert!(first.changed());
    let mutations = filter.mutations();
    let table = filter.snapshot();

    let second = reconcile(&filter, PORT, TCP, &allow, &guard).await.unwrap();
    assert!(!second.changed());
    assert_eq!(filter.mutations(), mutations);
    assert_eq!(filter.snapshot(), table);
}

#[tokio::test]
async fn lockout_risk_refuses_before_any_change() {
    let filter = MemoryPacketFilter::with_rules(vec![StoredRule::any(PORT, Some(TCP))]);
    let allow = allow_list(&["203.0.113.10"]);
    let guard = LockoutGuard::new(Some(addr("198.51.100.4")), false);

    let err = reconcile(&filter, PORT, TCP, &allow, &guard)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FirewallErrorKind::LockoutRisk);
    assert!(err.recovery_hint().unwrap().contains("198.51.100.4"));
    assert_eq!(filter.mutations(), 0);
}

#[tokio::test]
async fn confirmed_lockout_proceeds_and_is_reported() {
    let filter = MemoryPacketFilter::with_rules(vec![StoredRule::any(PORT, Some(TCP))]);
    let allow = allow_list(&["203.0.113.10"]);
    let guard = LockoutGuard::new(Some(addr("198.51.100.4")), true);

    let report = reconcile(&filter, PORT, TCP, &allow, &guard).await.unwrap();

    assert_eq!(report.lockout_override, Some(addr("198.51.100.4")));
    assert!(report.is_compliant());
}

#[tokio::test]
async fn inactive_filter_is_reported() {
    let filter = MemoryPacketFilter::default().inactive();
    let allow = allow_list(&["203.0.113.10"]);

    let report = reconcile(&filter, PORT, TCP, &allow, &LockoutGuard::default())
        .await
        .unwrap();

    assert!(!report.filter_active);
    assert_eq!(report.added.len(), 1);
}

#[tokio::test]
async fn held_firewall_lock_blocks_reconcile() {
    let state = tempfile::tempdir().unwrap();
    let _lock = HostLock::acquire(state.path(), FIREWALL_LOCK, false).unwrap();
    let filter = MemoryPacketFilter::with_rules(vec![StoredRule::any(PORT, Some(TCP))]);
    let allow = allow_list(&["203.0.113.10"]);

    let err = reconcile_locked(
        state.path(),
        false,
        &filter,
        PORT,
        TCP,
        &allow,
        &LockoutGuard::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FirewallError::Lock { .. }));
    assert_eq!(filter.mutations(), 0);

    let report = reconcile_locked(
        state.path(),
        true,
        &filter,
        PORT,
        TCP,
        &allow,
        &LockoutGuard::default(),
    )
    .await
    .unwrap();
    assert!(report.is_compliant());
}

#[test]
fn session_address_prefers_ssh_connection() {
    temp_env::with_vars(
        [
            ("SSH_CONNECTION", Some("198.51.100.4 52311 10.0.0.5 22")),
            ("SSH_CLIENT", Some("192.0.2.9 52311 22")),
        ],
        || assert_eq!(session_address_from_env(), Some(addr("198.51.100.4"))),
    );
}

#[test]
fn session_address_falls_back_to_ssh_client() {
    temp_env::with_vars(
        [
            ("SSH_CONNECTION", None),
            ("SSH_CLIENT", Some("2001:db8::2 52311 22")),
        ],
        || assert_eq!(session_address_from_env(), Some(addr("2001:db8::2"))),
    );
}

#[test]
fn no_ssh_session_means_no_lockout_check() {
    temp_env::with_vars(
        [("SSH_CONNECTION", None::<&str>), ("SSH_CLIENT", None)],
        || {
            let guard = LockoutGuard::from_env(false);
            assert_eq!(guard.session(), None);
            assert_eq!(guard.at_risk(&allow_list(&["203.0.113.10"])), None);
        },
    );
}

fn arb_source() -> impl Strategy<Value = SourceScope> {
    prop_oneof![
        Just(SourceScope::Any),
        prop::sample::select(vec!["203.0.113.10", "203.0.113.11", "198.51.100.7", "2001:db8::1"])
            .prop_map(|a| SourceScope::Address(addr(a))),
        Just(SourceScope::Other("10.0.0.0/8".to_string())),
    ]
}

fn arb_rule() -> impl Strategy<Value = StoredRule> {
    (
        prop::sample::select(vec![22u16, PORT, 8080]),
        prop::option::of(prop::sample::select(vec![Protocol::Tcp, Protocol::Udp])),
        prop::sample::select(vec![RuleAction::Allow, RuleAction::Deny, RuleAction::Limit]),
        arb_source(),
    )
        .prop_map(|(port, protocol, action, source)| StoredRule {
            port,
            protocol,
            action,
            source,
        })
}

fn arb_allow() -> impl Strategy<Value = NonEmpty<IpAddr>> {
    prop::sample::subsequence(vec!["203.0.113.10", "203.0.113.11", "2001:db8::1"], 1..=3)
        .prop_map(|addrs| allow_list(&addrs))
}

fn run<T>(f: impl std::future::Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

proptest! {
    #[test]
    fn any_starting_table_converges_exactly(
        rules in prop::collection::vec(arb_rule(), 0..12),
        allow in arb_allow(),
    ) {
        let filter = MemoryPacketFilter::with_rules(rules.clone());
        let report = run(reconcile(&filter, PORT, TCP, &allow, &LockoutGuard::default())).unwrap();
        prop_assert!(report.is_compliant());

        let after = run(governing(&filter));
        let expected: Vec<_> = allow
            .iter()
            .map(|a| (SourceScope::Address(*a), RuleAction::Allow, Some(TCP)))
            .collect();
        prop_assert_eq!(after.len(), expected.len());
        for rule in &expected {
            prop_assert!(after.contains(rule));
        }

        // Rules for other ports, and UDP-only rules, survive.
        let untouched = |r: &StoredRule| r.port != PORT || r.protocol == Some(Protocol::Udp);
        let before_other: Vec<_> = rules.iter().filter(|r| untouched(r)).cloned().collect();
        let after_other: Vec<_> = filter.snapshot().into_iter().filter(|r| untouched(r)).collect();
        prop_assert_eq!(before_other, after_other);
    }

    #[test]
    fn reconcile_is_idempotent(
        rules in prop::collection::vec(arb_rule(), 0..12),
        allow in arb_allow(),
    ) {
        let filter = MemoryPacketFilter::with_rules(rules);
        let guard = LockoutGuard::default();
        run(reconcile(&filter, PORT, TCP, &allow, &guard)).unwrap();
        let table = filter.snapshot();
        let mutations = filter.mutations();

        let second = run(reconcile(&filter, PORT, TCP, &allow, &guard)).unwrap();
        prop_assert!(!second.changed());
        prop_assert_eq!(filter.mutations(), mutations);
        prop_assert_eq!(filter.snapshot(), table);
    }
}
