mod schema;
mod value_helpers;

pub use schema::list_tools_result;

use serde_json::{json, Value};

use super::jsonrpc::{ok, tool_err, tool_ok, JsonRpcResponse};
use super::ServerState;
use crate::{
    errors::ToolError,
    guardian::GuardianChange,
    keystore::SaveKeystoreRequest,
    toolkit::{
        BalanceParams, CallViewParams, CrossChainParams, ForwardCallParams, GuardianParams,
        RecoverParams, Toolkit, TransferParams, TxResultParams,
    },
};
use value_helpers::{get_str, network_arg, parse_args, secret_arg, secret_str};

/// Fill in the connection's network when the caller did not name one.
fn with_network(mut args: Value, state: &ServerState) -> Value {
    if args.is_null() {
        args = json!({});
    }
    if let (Some(obj), Some(n)) = (args.as_object_mut(), state.network_override) {
        obj.entry("network")
            .or_insert_with(|| Value::String(n.as_str().to_owned()));
    }
    args
}

pub async fn handle_tools_call(
    req_id: Value,
    tool_name: &str,
    args: Value,
    state: &mut ServerState,
) -> JsonRpcResponse {
    let args = with_network(args, state);
    match dispatch(tool_name, args, state).await {
        Ok(Some(result)) => ok(req_id, result),
        Ok(None) => ok(
            req_id,
            tool_err(&ToolError::new(
                "unknown_tool",
                format!("unknown tool: {tool_name}"),
            )),
        ),
        Err(e) => {
            let te = ToolError::from_report(&e);
            tracing::debug!(tool = tool_name, code = te.code, "tool call failed");
            ok(req_id, tool_err(&te))
        }
    }
}

async fn dispatch(
    tool_name: &str,
    args: Value,
    state: &mut ServerState,
) -> eyre::Result<Option<Value>> {
    let toolkit = &state.toolkit;
    let out = match tool_name {
        // Writes
        "transfer" => {
            let p: TransferParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.transfer(&state.session, &p).await?)?
        }
        "cross_chain_transfer" => {
            let p: CrossChainParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.cross_chain_transfer(&state.session, &p).await?)?
        }
        "recover_stuck_transfer" => {
            let p: RecoverParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.recover_stuck_transfer(&state.session, &p).await?)?
        }
        "add_guardian" | "remove_guardian" => {
            let change = if tool_name == "add_guardian" {
                GuardianChange::Add
            } else {
                GuardianChange::Remove
            };
            let p: GuardianParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.change_guardian(&state.session, change, &p).await?)?
        }
        "forward_call" => {
            let p: ForwardCallParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.forward_call(&state.session, &p).await?)?
        }

        // Keystore
        "save_keystore" => {
            let req = SaveKeystoreRequest {
                password: secret_arg(&args, "password"),
                private_key: secret_str(&args, "privateKey"),
                mnemonic: secret_str(&args, "mnemonic"),
                ca_hash: get_str(&args, "caHash").unwrap_or_default().to_owned(),
                ca_address: get_str(&args, "caAddress").unwrap_or_default().to_owned(),
                origin_chain_id: get_str(&args, "originChainId")
                    .unwrap_or_default()
                    .to_owned(),
                network: network_arg(&args)?,
            };
            tool_ok(&toolkit.save_keystore(&mut state.session, req)?)?
        }
        "unlock" => {
            let password = secret_arg(&args, "password");
            let network = network_arg(&args)?;
            tool_ok(&toolkit.unlock(&mut state.session, &password, network)?)?
        }
        "lock" => {
            let was_unlocked = Toolkit::lock(&mut state.session);
            tool_ok(&json!({ "locked": true, "wasUnlocked": was_unlocked }))?
        }
        "wallet_status" => {
            let network = network_arg(&args)?;
            tool_ok(&toolkit.wallet_status(&state.session, network)?)?
        }

        // Reads
        "call_view" => {
            let p: CallViewParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.call_view(&p).await?)?
        }
        "balance" => {
            let p: BalanceParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.balance(&state.session, &p).await?)?
        }
        "tx_result" => {
            let p: TxResultParams = parse_args(tool_name, args)?;
            tool_ok(&toolkit.tx_result(&p).await?)?
        }
        "chain_info" => {
            let network = network_arg(&args)?;
            let refresh = args
                .get("refresh")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            tool_ok(&toolkit.chain_info(network, refresh).await?)?
        }
        "pending_transfers" => tool_ok(&toolkit.pending_transfers()?)?,

        // Utilities
        "create_wallet" => tool_ok(&Toolkit::create_wallet()?)?,
        "paths" => tool_ok(&toolkit.paths_json())?,
        _ => return Ok(None),
    };
    Ok(Some(out))
}
