use serde_json::{json, Value};

fn network_prop() -> Value {
    json!({ "type": "string", "enum": ["mainnet", "testnet"], "description": "Defaults to the configured network mode." })
}

fn token_props() -> Value {
    json!({
      "symbol": { "type": "string", "minLength": 1, "description": "Token symbol, e.g. ELF." },
      "amount": { "type": "integer", "minimum": 1, "description": "Amount in the token's smallest unit." },
      "memo": { "type": "string" }
    })
}

fn object_schema(mut props: Value, extra: &Value, required: &[&str]) -> Value {
    if let (Some(p), Some(e)) = (props.as_object_mut(), extra.as_object()) {
        for (k, v) in e {
            p.insert(k.clone(), v.clone());
        }
    }
    if let Some(p) = props.as_object_mut() {
        p.insert("network".to_owned(), network_prop());
    }
    json!({ "type": "object", "properties": props, "required": required, "additionalProperties": false })
}

fn write_tool_schemas() -> Vec<Value> {
    let guardian_props = json!({
      "chainId": { "type": "string" },
      "guardian": { "type": "object", "description": "Guardian record: type, verifierId, identifierHash and the verification fields." },
      "guardiansApproved": { "type": "array", "items": { "type": "object" }, "description": "Approvals from existing guardians. At least floor(n*3/5)+1 are required for n guardians." }
    });
    vec![
        json!({ "name": "transfer", "description": "Transfer tokens from the CA wallet on one chain (ManagerForwardCall -> Token.Transfer).", "inputSchema": object_schema(
            json!({ "chainId": { "type": "string" }, "to": { "type": "string", "minLength": 1 } }),
            &token_props(),
            &["chainId", "to", "symbol", "amount"],
        )}),
        json!({ "name": "cross_chain_transfer", "description": "Move tokens to another chain in two transactions: CA -> manager, then Token.CrossChainTransfer. If step 2 fails the error carries recovery details for recover_stuck_transfer.", "inputSchema": object_schema(
            json!({
              "chainId": { "type": "string", "description": "Source chain id, e.g. AELF." },
              "toChainId": { "type": "string", "description": "Destination chain id, e.g. tDVV." },
              "to": { "type": "string", "minLength": 1 },
              "issueChainId": { "type": "string", "description": "Chain the token was issued on. Defaults to the source chain." }
            }),
            &token_props(),
            &["chainId", "toChainId", "to", "symbol", "amount"],
        )}),
        json!({ "name": "recover_stuck_transfer", "description": "Return tokens stranded on the manager address after a failed cross-chain step 2 back to the CA address.", "inputSchema": object_schema(
            json!({ "chainId": { "type": "string" } }),
            &token_props(),
            &["chainId", "symbol", "amount"],
        )}),
        json!({ "name": "add_guardian", "description": "Add a guardian to the CA holder.", "inputSchema": object_schema(guardian_props.clone(), &json!({}), &["chainId", "guardian"]) }),
        json!({ "name": "remove_guardian", "description": "Remove a guardian from the CA holder.", "inputSchema": object_schema(guardian_props, &json!({}), &["chainId", "guardian"]) }),
        json!({ "name": "forward_call", "description": "Call any contract method as the CA through ManagerForwardCall. Args are encoded with the target method's protobuf input type.", "inputSchema": object_schema(
            json!({
              "chainId": { "type": "string" },
              "contractAddress": { "type": "string", "minLength": 1 },
              "methodName": { "type": "string", "minLength": 1 },
              "args": { "type": "object" },
              "caHash": { "type": "string", "description": "Defaults to the signing wallet's CA hash." }
            }),
            &json!({}),
            &["chainId", "contractAddress", "methodName", "args"],
        )}),
    ]
}

fn keystore_tool_schemas() -> Vec<Value> {
    vec![
        json!({ "name": "save_keystore", "description": "Encrypt the manager key and CA metadata into the per-network keystore and unlock it for this connection.", "inputSchema": object_schema(
            json!({
              "password": { "type": "string", "minLength": 1 },
              "privateKey": { "type": "string", "minLength": 1 },
              "mnemonic": { "type": "string", "minLength": 1 },
              "caHash": { "type": "string", "minLength": 1 },
              "caAddress": { "type": "string", "minLength": 1 },
              "originChainId": { "type": "string", "description": "Defaults to AELF." }
            }),
            &json!({}),
            &["password", "privateKey", "mnemonic", "caHash", "caAddress"],
        )}),
        json!({ "name": "unlock", "description": "Decrypt the keystore for this connection.", "inputSchema": object_schema(
            json!({ "password": { "type": "string", "minLength": 1 } }),
            &json!({}),
            &["password"],
        )}),
        json!({ "name": "lock", "description": "Forget the unlocked wallet.", "inputSchema": { "type": "object", "properties": {}, "additionalProperties": false } }),
        json!({ "name": "wallet_status", "description": "Whether a keystore exists and is unlocked, plus its CA metadata.", "inputSchema": object_schema(json!({}), &json!({}), &[]) }),
    ]
}

fn read_tool_schemas() -> Vec<Value> {
    vec![
        json!({ "name": "call_view", "description": "Call a read-only contract method.", "inputSchema": object_schema(
            json!({
              "chainId": { "type": "string" },
              "contractAddress": { "type": "string", "minLength": 1 },
              "methodName": { "type": "string", "minLength": 1 },
              "args": { "type": "object" }
            }),
            &json!({}),
            &["chainId", "contractAddress", "methodName"],
        )}),
        json!({ "name": "balance", "description": "Token balance. Owner defaults to the wallet's CA address.", "inputSchema": object_schema(
            json!({
              "chainId": { "type": "string" },
              "symbol": { "type": "string", "minLength": 1 },
              "owner": { "type": "string" }
            }),
            &json!({}),
            &["chainId", "symbol"],
        )}),
        json!({ "name": "tx_result", "description": "Fetch a transaction result by id.", "inputSchema": object_schema(
            json!({ "chainId": { "type": "string" }, "transactionId": { "type": "string", "minLength": 1 } }),
            &json!({}),
            &["chainId", "transactionId"],
        )}),
        json!({ "name": "chain_info", "description": "Chain descriptors (endpoint, CA and token contracts) for a network.", "inputSchema": object_schema(
            json!({ "refresh": { "type": "boolean", "default": false } }),
            &json!({}),
            &[],
        )}),
        json!({ "name": "pending_transfers", "description": "Cross-chain transfers that have not completed, from the local journal.", "inputSchema": { "type": "object", "properties": {}, "additionalProperties": false } }),
    ]
}

fn utility_tool_schemas() -> Vec<Value> {
    vec![
        json!({ "name": "create_wallet", "description": "Generate a fresh manager wallet (mnemonic and key). Nothing is stored.", "inputSchema": { "type": "object", "properties": {}, "additionalProperties": false } }),
        json!({ "name": "paths", "description": "Local directories and files used by cawallet.", "inputSchema": { "type": "object", "properties": {}, "additionalProperties": false } }),
    ]
}

pub fn list_tools_result() -> Value {
    let mut tools = write_tool_schemas();
    tools.extend(keystore_tool_schemas());
    tools.extend(read_tool_schemas());
    tools.extend(utility_tool_schemas());
    json!({ "tools": tools })
}
