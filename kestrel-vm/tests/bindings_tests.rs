//! Capability binding scenarios: argument validation, host delegation,
//! storage-cost accounting, frozen snapshots, and version gating.

mod common;

use std::sync::{Arc, Mutex};

use common::platform_with;
use kestrel_vm::runtime::ScriptValue;
use kestrel_vm::{
    CapabilityVersion, Costed, HostCallbacks, LogLevel, TxInput, TxOutput, TxSnapshot,
    UtxoSnapshot, VmStatus,
};
use num_bigint::BigInt;

#[test]
fn storage_get_returns_value_and_charges_cost() {
    let callbacks = HostCallbacks::builder()
        .storage_get(|_handler, key| {
            if key == "k" {
                Costed::new(Some("v".to_string()), 13)
            } else {
                Costed::free(None)
            }
        })
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("read_storage()", |ctx| {
        let hit = ctx.call("_native_storage", "get", &[ScriptValue::string("k")])?;
        assert_eq!(hit, ScriptValue::string("v"));
        let miss = ctx.call("_native_storage", "get", &[ScriptValue::string("other")])?;
        assert_eq!(miss, ScriptValue::Null);
        Ok(hit)
    });

    let engine = platform.create_engine();
    let outcome = engine.run_script("read_storage()", 0, 7);
    assert_eq!(outcome.status, VmStatus::Success);
    assert_eq!(outcome.result.as_deref(), Some("v"));
    // The host-reported storage cost lands on the instruction counter.
    assert_eq!(engine.instructions_executed(), 13);
}

#[test]
fn storage_set_and_del_delegate_with_handler() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let callbacks = HostCallbacks::builder()
        .storage_set(move |handler, key, value| {
            log.lock().unwrap().push(format!("set:{handler}:{key}:{value}"));
            Costed::new(0, 5)
        })
        .storage_del(|_, _| Costed::free(0))
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("write_storage()", |ctx| {
        let ret = ctx.call(
            "_native_storage",
            "set",
            &[ScriptValue::string("k"), ScriptValue::string("v")],
        )?;
        assert_eq!(ret, ScriptValue::Number(0.0));
        ctx.call("_native_storage", "del", &[ScriptValue::string("k")])
    });

    let engine = platform.create_engine();
    let outcome = engine.run_script("write_storage()", 0, 42);
    assert_eq!(outcome.status, VmStatus::Success);
    assert_eq!(seen.lock().unwrap().as_slice(), ["set:42:k:v"]);
    assert_eq!(engine.instructions_executed(), 5);
}

#[test]
fn binding_argument_validation_is_deterministic() {
    let callbacks = HostCallbacks::builder()
        .storage_get(|_, _| Costed::free(None))
        .transfer(|_, _, _, _| Costed::free(0))
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("misuse()", |ctx| {
        let err = ctx
            .call(
                "_native_blockchain",
                "transfer",
                &[ScriptValue::string("a"), ScriptValue::string("1")],
            )
            .unwrap_err();
        assert_eq!(err.message, "Blockchain.transfer() requires 3 arguments");

        let err = ctx
            .call("_native_storage", "get", &[ScriptValue::Number(4.0)])
            .unwrap_err();
        assert_eq!(err.message, "key must be string");

        let err = ctx
            .call("_native_storage", "get", &[])
            .unwrap_err();
        assert_eq!(err.message, "Storage.get() requires 1 argument");
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(engine.run_script("misuse()", 0, 1).status, VmStatus::Success);
}

#[test]
fn unset_capability_throws_script_side() {
    let (_dir, runtime, platform) = platform_with(HostCallbacks::empty()).unwrap();
    runtime.on("orphan_call()", |ctx| {
        let err = ctx
            .call("_native_storage", "get", &[ScriptValue::string("k")])
            .unwrap_err();
        assert_eq!(err.message, "storage is not supported by the host");
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(
        engine.run_script("orphan_call()", 0, 1).status,
        VmStatus::Success
    );
}

#[test]
fn blockchain_binding_covers_superset_surface() {
    let callbacks = HostCallbacks::builder()
        .verify_address(|addr| Costed::new(addr.starts_with("kAddr"), 2))
        .transfer(|_, _, _, _| Costed::new(0, 3))
        .block_height(|_| 1042)
        .node_address(|_| Some("kAddrNode".to_string()))
        .delete_contract(|_| 0)
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("chain_calls()", |ctx| {
        let ok = ctx.call(
            "_native_blockchain",
            "verifyAddress",
            &[ScriptValue::string("kAddr9")],
        )?;
        assert_eq!(ok, ScriptValue::Number(1.0));

        let height = ctx.call("_native_blockchain", "getCurrBlockHeight", &[])?;
        assert_eq!(height, ScriptValue::Number(1042.0));

        let node = ctx.call("_native_blockchain", "getNodeAddress", &[])?;
        assert_eq!(node, ScriptValue::string("kAddrNode"));

        let transferred = ctx.call(
            "_native_blockchain",
            "transfer",
            &[
                ScriptValue::string("kAddr1"),
                ScriptValue::string("20"),
                ScriptValue::string("1"),
            ],
        )?;
        assert_eq!(transferred, ScriptValue::Number(0.0));

        let deleted = ctx.call("_native_blockchain", "deleteContract", &[])?;
        assert_eq!(deleted, ScriptValue::Number(0.0));
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(
        engine.run_script("chain_calls()", 0, 1).status,
        VmStatus::Success
    );
    // verifyAddress (2) + transfer (3) costs.
    assert_eq!(engine.instructions_executed(), 5);
}

#[test]
fn tx_snapshot_is_published_frozen_with_precise_amounts() {
    let callbacks = HostCallbacks::builder()
        .transaction_get(|_| {
            Some(TxSnapshot {
                id: "txid-0".to_string(),
                vin: vec![TxInput {
                    txid: "prev-0".to_string(),
                    vout: 1,
                    signature: "sig-0".to_string(),
                    pubkey: "pk-0".to_string(),
                }],
                vout: vec![
                    TxOutput {
                        amount: 5,
                        pubkeyhash: "pkh-0".to_string(),
                    },
                    TxOutput {
                        amount: 9_007_199_254_740_993,
                        pubkeyhash: "pkh-1".to_string(),
                    },
                ],
                tip: 2,
            })
        })
        .prev_utxos_get(|_| {
            vec![UtxoSnapshot {
                txid: "prev-0".to_string(),
                tx_index: 1,
                value: i64::MAX,
                pubkeyhash: "pkh-0".to_string(),
                address: "kAddr0".to_string(),
            }]
        })
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("inspect_tx()", |ctx| {
        let ScriptValue::Object(tx) = ctx.data_global("_tx").expect("_tx is published") else {
            panic!("_tx must be an object");
        };
        let vin = field(&tx, "vin");
        let ScriptValue::Array(vin) = vin else {
            panic!("vin must be an array")
        };
        let ScriptValue::Object(first_in) = &vin[0] else {
            panic!("vin[0] must be an object")
        };
        assert_eq!(field(first_in, "pubkey"), ScriptValue::string("pk-0"));
        assert_eq!(field(first_in, "vout"), ScriptValue::Number(1.0));

        let ScriptValue::Array(vout) = field(&tx, "vout") else {
            panic!("vout must be an array")
        };
        let ScriptValue::Object(second_out) = &vout[1] else {
            panic!("vout[1] must be an object")
        };
        // Past 2^53 the amount still round-trips exactly.
        assert_eq!(
            field(second_out, "amount"),
            ScriptValue::BigInt(BigInt::from(9_007_199_254_740_993_i64))
        );

        let ScriptValue::Array(utxos) = ctx.data_global("_prevUtxos").expect("published") else {
            panic!("_prevUtxos must be an array")
        };
        let ScriptValue::Object(utxo) = &utxos[0] else {
            panic!("utxo must be an object")
        };
        assert_eq!(
            field(utxo, "value"),
            ScriptValue::BigInt(BigInt::from(i64::MAX))
        );

        // The snapshots are frozen; assignment fails.
        let err = ctx.assign_global("_tx").unwrap_err();
        assert!(err.message.contains("read only"));
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(
        engine.run_script("inspect_tx()", 0, 1).status,
        VmStatus::Success
    );
}

#[test]
fn crypto_binding_delegates_verification() {
    let callbacks = HostCallbacks::builder()
        .verify_signature(|msg, _pk, sig| msg == "m" && sig == "good")
        .verify_public_key(|addr, pk| addr == "kAddr" && pk == "pk")
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("verify()", |ctx| {
        let ok = ctx.call(
            "crypto",
            "verifySignature",
            &[
                ScriptValue::string("m"),
                ScriptValue::string("pk"),
                ScriptValue::string("good"),
            ],
        )?;
        assert_eq!(ok, ScriptValue::Bool(true));

        let bad = ctx.call(
            "crypto",
            "verifySignature",
            &[
                ScriptValue::string("m"),
                ScriptValue::string("pk"),
                ScriptValue::string("forged"),
            ],
        )?;
        assert_eq!(bad, ScriptValue::Bool(false));

        let pk_ok = ctx.call(
            "crypto",
            "verifyPublicKey",
            &[ScriptValue::string("kAddr"), ScriptValue::string("pk")],
        )?;
        assert_eq!(pk_ok, ScriptValue::Bool(true));
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(engine.run_script("verify()", 0, 1).status, VmStatus::Success);
}

#[test]
fn reward_and_event_bindings_delegate() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callbacks = HostCallbacks::builder()
        .record_reward(|_, addr, amount| {
            assert_eq!((addr, amount), ("kAddr1", "8"));
            0
        })
        .trigger_event(move |_, topic, data| {
            sink.lock().unwrap().push((topic.to_string(), data.to_string()));
            1
        })
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("emit()", |ctx| {
        let recorded = ctx.call(
            "_native_reward",
            "record",
            &[ScriptValue::string("kAddr1"), ScriptValue::string("8")],
        )?;
        assert_eq!(recorded, ScriptValue::Number(0.0));

        ctx.call(
            "event",
            "trigger",
            &[
                ScriptValue::string("Transfer"),
                ScriptValue::string(r#"{"to":"kAddr1"}"#),
            ],
        )
    });

    let engine = platform.create_engine();
    assert_eq!(engine.run_script("emit()", 0, 1).status, VmStatus::Success);
    assert_eq!(
        events.lock().unwrap().as_slice(),
        [("Transfer".to_string(), r#"{"to":"kAddr1"}"#.to_string())]
    );
}

#[test]
fn logger_binding_forwards_levels_and_args() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let callbacks = HostCallbacks::builder()
        .logger(move |level, args| {
            sink.lock().unwrap().push((level, args.to_vec()));
        })
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("chatty()", |ctx| {
        ctx.call(
            "_log",
            "info",
            &[ScriptValue::string("height"), ScriptValue::Number(7.0)],
        )?;
        ctx.call("_log", "error", &[ScriptValue::string("failed")])?;
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(engine.run_script("chatty()", 0, 1).status, VmStatus::Success);

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].0, LogLevel::Info);
    assert_eq!(lines[0].1, vec!["height".to_string(), "7".to_string()]);
    assert_eq!(lines[1].0, LogLevel::Error);
}

#[test]
fn math_random_stays_in_range_and_replays_deterministically() {
    let samples = Arc::new(Mutex::new(Vec::new()));
    let (_dir, runtime, platform) = platform_with(HostCallbacks::empty()).unwrap();
    {
        let samples = Arc::clone(&samples);
        runtime.on("roll_dice()", move |ctx| {
            let mut run = Vec::new();
            for _ in 0..64 {
                let v = ctx.call("math", "random", &[ScriptValue::Number(10.0)])?;
                let n = v.as_number().unwrap();
                // Documented contract: [0, max).
                assert!((0.0..10.0).contains(&n));
                run.push(n as i64);
            }
            samples.lock().unwrap().push(run);
            Ok(ScriptValue::Undefined)
        });
    }

    for _ in 0..2 {
        let mut engine = platform.create_engine();
        engine.set_version(
            CapabilityVersion::MATH | CapabilityVersion::MATH_RANDOM | CapabilityVersion::BLOCKCHAIN,
        );
        engine.import_seed(42);
        assert_eq!(
            engine.run_script("roll_dice()", 0, 1).status,
            VmStatus::Success
        );
    }

    let samples = samples.lock().unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0], samples[1]);
}

#[test]
fn version_mask_gates_capability_groups() {
    let callbacks = HostCallbacks::builder()
        .verify_address(|_| Costed::free(true))
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("probe_surface()", |ctx| {
        let err = ctx
            .call("_native_blockchain", "verifyAddress", &[ScriptValue::string("a")])
            .unwrap_err();
        assert_eq!(err.message, "_native_blockchain is not defined");
        let err = ctx
            .call("math", "random", &[ScriptValue::Number(4.0)])
            .unwrap_err();
        assert_eq!(err.message, "math is not defined");
        Ok(ScriptValue::Undefined)
    });

    let mut engine = platform.create_engine();
    engine.set_version(CapabilityVersion(0));
    assert_eq!(
        engine.run_script("probe_surface()", 0, 1).status,
        VmStatus::Success
    );
}

#[test]
fn counter_accessor_tracks_binding_costs() {
    let callbacks = HostCallbacks::builder()
        .storage_set(|_, _, _| Costed::new(0, 21))
        .build();
    let (_dir, runtime, platform) = platform_with(callbacks).unwrap();
    runtime.on("count_costs()", |ctx| {
        ctx.call(
            "_native_storage",
            "set",
            &[ScriptValue::string("k"), ScriptValue::string("v")],
        )?;
        let count = ctx.read_accessor("_instruction_counter", "count")?;
        assert_eq!(count, ScriptValue::Number(21.0));
        Ok(ScriptValue::Undefined)
    });

    let engine = platform.create_engine();
    assert_eq!(
        engine.run_script("count_costs()", 0, 1).status,
        VmStatus::Success
    );
}

fn field(fields: &[(String, ScriptValue)], name: &str) -> ScriptValue {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| panic!("missing field {name}"))
}
