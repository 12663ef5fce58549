//! Integration test: misreport slashing with audit indices.
//!
//! Exercises the slashing path end to end:
//! 1. Five nodes report into bucket 2, one far off the consensus
//! 2. Slashing waits for finalization
//! 3. The report index is rebuilt from the event log
//! 4. Honest reports and mismatched indices are refused
//! 5. An exit reorders the registry; the stale registry index is refused
//!    and the fresh one succeeds
//! 6. The slasher is paid and repeat slashes are refused
//! 7. Balances plus escrow still account for the whole supply
//! 8. A penalty that drains the stake removes the node

use ora_bot::audit;
use ora_chain::{Call, ChainError, LocalChain, Receipt, Transaction};
use ora_oracle::{OracleError, OracleParams};
use ora_types::{ora, Address, OracleEvent};

fn send(chain: &mut LocalChain, from: Address, call: Call) -> Receipt {
    let hash = chain
        .submit(Transaction::new(from, call))
        .expect("submit");
    chain.receipt(&hash).cloned().expect("automined")
}

fn reverted_with(receipt: &Receipt) -> Option<OracleError> {
    match &receipt.error {
        Some(ChainError::Oracle(e)) => Some(e.clone()),
        _ => None,
    }
}

/// Register `labels` in order with 500 ORA each, starting in bucket 2.
fn staked_chain(params: OracleParams, labels: &[&str]) -> (LocalChain, Vec<Address>) {
    let mut chain = LocalChain::new(params).expect("chain").with_automine(true);
    let nodes: Vec<Address> = labels.iter().map(|l| Address::derive(l)).collect();
    for n in &nodes {
        chain.faucet(n, ora(500)).expect("faucet");
    }
    chain.mine_to_next_bucket();
    for n in &nodes {
        let r = send(&mut chain, *n, Call::RegisterNode { stake: ora(500) });
        assert!(r.success(), "{:?}", r.error);
    }
    (chain, nodes)
}

#[test]
fn slash_outlier_with_reconstructed_indices() {
    // registry order: a, b, c, e, d
    let (mut chain, registry) =
        staked_chain(OracleParams::default(), &["a", "b", "c", "e", "d"]);
    let (a, b, c, e, d) = (registry[0], registry[1], registry[2], registry[3], registry[4]);
    let slasher = Address::derive("slasher");

    // =========================================================
    // Step 1: Reports, d is the outlier
    // =========================================================

    for (n, price) in [(a, 1_000u128), (b, 1_000), (c, 1_000), (d, 1_500), (e, 1_000)] {
        assert!(send(&mut chain, n, Call::ReportPrice { price }).success());
    }
    chain.mine_to_next_bucket();

    // =========================================================
    // Step 2: Not finalized yet
    // =========================================================

    let slash = Call::SlashNode {
        node: d,
        bucket: 2,
        report_index: 3,
        registry_index: 4,
    };
    let early = send(&mut chain, slasher, slash.clone());
    assert_eq!(reverted_with(&early), Some(OracleError::MedianNotRecorded(2)));

    let current = send(
        &mut chain,
        slasher,
        Call::SlashNode {
            node: d,
            bucket: 3,
            report_index: 0,
            registry_index: 4,
        },
    );
    assert_eq!(
        reverted_with(&current),
        Some(OracleError::OnlyPastBucketsAllowed {
            bucket: 3,
            current: 3
        })
    );

    assert!(send(&mut chain, slasher, Call::RecordBucketMedian { bucket: 2 }).success());
    assert_eq!(chain.get_past_price(2), Ok(1_000));
    assert_eq!(chain.get_outlier_nodes(2), Ok(vec![d]));

    // =========================================================
    // Step 3: Audit index from the log
    // =========================================================

    let report_index = audit::report_index(chain.events(), 2, &d).expect("reported");
    assert_eq!(report_index, 3);
    let emitted = chain.price_reports(2).iter().find_map(|ev| match ev.event {
        OracleEvent::PriceReported {
            node, report_index, ..
        } if node == d => Some(report_index),
        _ => None,
    });
    assert_eq!(emitted, Some(report_index));

    // =========================================================
    // Step 4: Refusals
    // =========================================================

    let honest = send(
        &mut chain,
        slasher,
        Call::SlashNode {
            node: a,
            bucket: 2,
            report_index: 0,
            registry_index: 0,
        },
    );
    assert_eq!(reverted_with(&honest), Some(OracleError::NotDeviated));

    let wrong_report = send(
        &mut chain,
        slasher,
        Call::SlashNode {
            node: d,
            bucket: 2,
            report_index: 2,
            registry_index: 4,
        },
    );
    assert_eq!(reverted_with(&wrong_report), Some(OracleError::NodeNotAtGivenIndex(2)));

    let past_end = send(
        &mut chain,
        slasher,
        Call::SlashNode {
            node: d,
            bucket: 2,
            report_index: 9,
            registry_index: 4,
        },
    );
    assert_eq!(
        reverted_with(&past_end),
        Some(OracleError::IndexOutOfBounds { index: 9, len: 5 })
    );

    let stranger = send(
        &mut chain,
        slasher,
        Call::SlashNode {
            node: slasher,
            bucket: 2,
            report_index: 0,
            registry_index: 0,
        },
    );
    assert_eq!(reverted_with(&stranger), Some(OracleError::NodeNotRegistered));

    // =========================================================
    // Step 5: Bravo exits in bucket 4, d moves into its slot
    // =========================================================

    chain.mine_to_next_bucket();
    assert_eq!(chain.current_bucket_number(), 4);
    assert!(send(&mut chain, b, Call::ExitNode { index: 1 }).success());
    assert_eq!(chain.get_node_addresses(), vec![a, d, c, e]);

    let stale = send(&mut chain, slasher, slash);
    assert_eq!(
        reverted_with(&stale),
        Some(OracleError::IndexOutOfBounds { index: 4, len: 4 })
    );

    let fresh_index = chain
        .get_node_addresses()
        .iter()
        .position(|n| *n == d)
        .expect("registered") as u64;
    let fresh = Call::SlashNode {
        node: d,
        bucket: 2,
        report_index,
        registry_index: fresh_index,
    };
    let slashed = send(&mut chain, slasher, fresh.clone());
    assert!(slashed.success(), "{:?}", slashed.error);
    assert_eq!(
        slashed.events[0].event,
        OracleEvent::NodeSlashed {
            node: d,
            bucket: 2,
            amount: ora(100)
        }
    );

    // =========================================================
    // Step 6: Reward and repeat
    // =========================================================

    assert_eq!(chain.balance_of(&slasher), ora(10));
    assert_eq!(chain.get_node_info(&d).staked_amount, ora(400));
    assert_eq!(chain.get_slashed_status(&d, 2), (1_500, true));
    assert_eq!(chain.get_slashed_status(&a, 2), (1_000, false));

    let repeat = send(&mut chain, slasher, fresh);
    assert_eq!(reverted_with(&repeat), Some(OracleError::NodeAlreadySlashed(2)));
    assert_eq!(chain.balance_of(&slasher), ora(10));

    // =========================================================
    // Step 7: Conservation
    // =========================================================

    let held: u128 = registry
        .iter()
        .chain(std::iter::once(&slasher))
        .map(|n| chain.balance_of(n))
        .sum();
    assert_eq!(chain.balances().total_supply(), held + chain.balances().escrow());
    // 5 x 500 faucet, 90 ORA of the penalty burned
    assert_eq!(chain.balances().total_supply(), ora(2_500 - 90));
    // remaining stakes plus bravo's one decayed ORA
    let staked: u128 = chain
        .get_node_addresses()
        .iter()
        .map(|n| chain.get_node_info(n).staked_amount)
        .sum();
    assert_eq!(chain.balances().escrow(), staked + ora(1));
}

#[test]
fn slash_to_zero_removes_node() {
    let params = OracleParams {
        misreport_penalty: ora(1_000),
        ..OracleParams::default()
    };
    let (mut chain, nodes) = staked_chain(params, &["x", "y", "z"]);
    let (x, y, z) = (nodes[0], nodes[1], nodes[2]);
    let slasher = Address::derive("slasher");

    for (n, price) in [(x, 2_000u128), (y, 1_000), (z, 1_000)] {
        assert!(send(&mut chain, n, Call::ReportPrice { price }).success());
    }
    chain.mine_to_next_bucket();
    assert!(send(&mut chain, slasher, Call::RecordBucketMedian { bucket: 2 }).success());
    let escrow_before = chain.balances().escrow();
    let supply_before = chain.balances().total_supply();

    let r = send(
        &mut chain,
        slasher,
        Call::SlashNode {
            node: x,
            bucket: 2,
            report_index: 0,
            registry_index: 0,
        },
    );
    assert!(r.success(), "{:?}", r.error);
    let events: Vec<OracleEvent> = r.events.into_iter().map(|e| e.event).collect();
    assert_eq!(
        events,
        vec![
            OracleEvent::NodeSlashed {
                node: x,
                bucket: 2,
                amount: ora(500)
            },
            OracleEvent::NodeExited {
                node: x,
                amount: 0
            },
        ]
    );

    // z swapped into x's slot
    assert_eq!(chain.get_node_addresses(), vec![z, y]);
    assert!(!chain.get_node_info(&x).is_registered());
    assert_eq!(chain.get_effective_stake(&x), 0);
    assert_eq!(chain.balance_of(&slasher), ora(50));
    // the whole stake leaves escrow: 50 ORA to the slasher, 450 burned
    assert_eq!(chain.balances().escrow(), escrow_before - ora(500));
    assert_eq!(chain.balances().total_supply(), supply_before - ora(450));
    let held: u128 = nodes
        .iter()
        .chain(std::iter::once(&slasher))
        .map(|n| chain.balance_of(n))
        .sum();
    assert_eq!(chain.balances().total_supply(), held + chain.balances().escrow());

    let again = send(&mut chain, x, Call::ReportPrice { price: 1_000 });
    assert_eq!(reverted_with(&again), Some(OracleError::NodeNotRegistered));
}
