//! Frozen transaction and UTXO snapshots: the `_tx` and `_prevUtxos`
//! globals.
//!
//! Amounts are 64-bit host-side and cross into the script as
//! arbitrary-precision values; 32-bit index fields stay plain integers.

use num_bigint::BigInt;

use super::BindingEnv;
use crate::host::{TxSnapshot, UtxoSnapshot};
use crate::runtime::{DataGlobal, ScriptValue};

pub(super) fn data_globals(env: &BindingEnv) -> Vec<DataGlobal> {
    let mut globals = Vec::new();

    if let Some(get) = env.callbacks.transaction_get.as_ref() {
        if let Some(tx) = get(env.handler) {
            globals.push(DataGlobal {
                name: "_tx".to_string(),
                value: tx_value(&tx),
            });
        }
    }

    if let Some(get) = env.callbacks.prev_utxos_get.as_ref() {
        let utxos = get(env.handler);
        globals.push(DataGlobal {
            name: "_prevUtxos".to_string(),
            value: ScriptValue::Array(utxos.iter().map(utxo_value).collect()),
        });
    }

    globals
}

fn tx_value(tx: &TxSnapshot) -> ScriptValue {
    let vin = tx
        .vin
        .iter()
        .map(|input| {
            ScriptValue::Object(vec![
                ("txid".to_string(), ScriptValue::string(&input.txid)),
                ("vout".to_string(), ScriptValue::from(input.vout)),
                ("signature".to_string(), ScriptValue::string(&input.signature)),
                ("pubkey".to_string(), ScriptValue::string(&input.pubkey)),
            ])
        })
        .collect();

    let vout = tx
        .vout
        .iter()
        .map(|output| {
            ScriptValue::Object(vec![
                (
                    "amount".to_string(),
                    ScriptValue::BigInt(BigInt::from(output.amount)),
                ),
                (
                    "pubkeyhash".to_string(),
                    ScriptValue::string(&output.pubkeyhash),
                ),
            ])
        })
        .collect();

    ScriptValue::Object(vec![
        ("id".to_string(), ScriptValue::string(&tx.id)),
        ("vin".to_string(), ScriptValue::Array(vin)),
        ("vout".to_string(), ScriptValue::Array(vout)),
        ("tip".to_string(), ScriptValue::BigInt(BigInt::from(tx.tip))),
    ])
}

fn utxo_value(utxo: &UtxoSnapshot) -> ScriptValue {
    ScriptValue::Object(vec![
        ("txid".to_string(), ScriptValue::string(&utxo.txid)),
        ("txIndex".to_string(), ScriptValue::from(utxo.tx_index)),
        (
            "value".to_string(),
            ScriptValue::BigInt(BigInt::from(utxo.value)),
        ),
        ("pubkeyhash".to_string(), ScriptValue::string(&utxo.pubkeyhash)),
        ("address".to_string(), ScriptValue::string(&utxo.address)),
    ])
}
