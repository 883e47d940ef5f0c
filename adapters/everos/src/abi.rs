//! Minimal contract ABI fragments the provider needs to encode wallet calls
//! and decode pool events. Only the functions and events the staking policy
//! exercises are declared; the node ignores the rest.

use serde_json::{json, Value};

/// SafeMultisig wallet ABI, `submitTransaction` only.
pub fn wallet() -> Value {
    json!({
        "ABI version": 2,
        "header": ["pubkey", "time", "expire"],
        "functions": [
            {
                "name": "submitTransaction",
                "inputs": [
                    { "name": "dest", "type": "address" },
                    { "name": "value", "type": "uint128" },
                    { "name": "bounce", "type": "bool" },
                    { "name": "allBalance", "type": "bool" },
                    { "name": "payload", "type": "cell" }
                ],
                "outputs": [
                    { "name": "transId", "type": "uint64" }
                ]
            }
        ],
        "data": [],
        "events": []
    })
}

/// DePool ABI: the `ticktock` entry point and the election-flow events.
pub fn depool() -> Value {
    json!({
        "ABI version": 2,
        "header": ["time", "expire"],
        "functions": [
            { "name": "ticktock", "inputs": [], "outputs": [] }
        ],
        "data": [],
        "events": [
            {
                "name": "StakeSigningRequested",
                "inputs": [
                    { "name": "electionId", "type": "uint32" },
                    { "name": "proxy", "type": "address" }
                ]
            },
            { "name": "RoundStakeIsAccepted", "inputs": [
                { "name": "queryId", "type": "uint64" },
                { "name": "comment", "type": "uint32" }
            ] },
            { "name": "RoundStakeIsRejected", "inputs": [
                { "name": "queryId", "type": "uint64" },
                { "name": "comment", "type": "uint32" }
            ] },
            { "name": "ProxyHasRejectedTheStake", "inputs": [
                { "name": "queryId", "type": "uint64" }
            ] }
        ]
    })
}
