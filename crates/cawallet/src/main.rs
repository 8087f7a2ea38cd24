#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use cawallet::{
    cli_output::{print_error, print_json, print_mcp_banner, prompt_password},
    config::NetworkMode,
    errors::{CaError, ToolError},
    guardian::GuardianChange,
    keystore::{SaveKeystoreRequest, Session, PRIVATE_KEY_ENV},
    paths::CaPaths,
    rpc,
    toolkit::{
        BalanceParams, CallViewParams, CrossChainParams, ForwardCallParams, GuardianParams,
        RecoverParams, Toolkit, TransferParams, TxResultParams,
    },
    transfer::{CrossChainTransferParams, TokenAmount},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::Context as _;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{io::IsTerminal as _, process::ExitCode};
use tracing_subscriber::prelude::*;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliNetworkMode {
    Mainnet,
    Testnet,
}

impl From<CliNetworkMode> for NetworkMode {
    fn from(v: CliNetworkMode) -> Self {
        match v {
            CliNetworkMode::Mainnet => Self::Mainnet,
            CliNetworkMode::Testnet => Self::Testnet,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cawallet", version)]
struct Cli {
    /// Network for this invocation. Defaults to the configured network mode.
    #[arg(long, value_enum, global = true)]
    network: Option<CliNetworkMode>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct TokenArgs {
    #[arg(long)]
    symbol: String,
    /// Amount in the token's smallest unit.
    #[arg(long)]
    amount: i64,
    #[arg(long, default_value = "")]
    memo: String,
}

impl From<TokenArgs> for TokenAmount {
    fn from(t: TokenArgs) -> Self {
        Self {
            symbol: t.symbol,
            amount: t.amount,
            memo: t.memo,
        }
    }
}

#[derive(Args, Debug)]
struct PasswordArg {
    /// Keystore password. When omitted and a keystore exists, it is prompted for on a
    /// terminal; otherwise `CAWALLET_PRIVATE_KEY` signs.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct GuardianArgs {
    #[arg(long = "chain")]
    chain_id: String,
    /// Guardian record as JSON.
    #[arg(long)]
    guardian: String,
    /// Approvals from existing guardians, as a JSON array.
    #[arg(long, default_value = "[]")]
    guardians_approved: String,
    #[command(flatten)]
    auth: PasswordArg,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Wallet(WalletCommand),

    /// Generate a fresh manager wallet. Nothing is stored.
    CreateWallet,

    /// Run the MCP server over stdio.
    Mcp,
}

/// Commands that run against an opened [`Toolkit`].
#[derive(Subcommand, Debug)]
enum WalletCommand {
    /// Transfer tokens from the CA wallet on one chain.
    Transfer {
        #[arg(long = "chain")]
        chain_id: String,
        #[arg(long)]
        to: String,
        #[command(flatten)]
        token: TokenArgs,
        #[command(flatten)]
        auth: PasswordArg,
    },

    /// Move tokens to another chain (CA -> manager, then `CrossChainTransfer`).
    CrossChainTransfer {
        /// Source chain.
        #[arg(long = "chain")]
        chain_id: String,
        #[arg(long = "to-chain")]
        to_chain_id: String,
        #[arg(long)]
        to: String,
        #[command(flatten)]
        token: TokenArgs,
        /// Chain the token was issued on. Defaults to the source chain.
        #[arg(long)]
        issue_chain_id: Option<String>,
        #[command(flatten)]
        auth: PasswordArg,
    },

    /// Return tokens stranded on the manager address to the CA address.
    RecoverStuckTransfer {
        #[arg(long = "chain")]
        chain_id: String,
        #[command(flatten)]
        token: TokenArgs,
        #[command(flatten)]
        auth: PasswordArg,
    },

    AddGuardian(GuardianArgs),

    RemoveGuardian(GuardianArgs),

    /// Call any contract method as the CA through `ManagerForwardCall`.
    ForwardCall {
        #[arg(long = "chain")]
        chain_id: String,
        #[arg(long)]
        contract_address: String,
        #[arg(long)]
        method_name: String,
        /// Method arguments as JSON.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Defaults to the keystore's CA hash.
        #[arg(long)]
        ca_hash: Option<String>,
        #[command(flatten)]
        auth: PasswordArg,
    },

    /// Encrypt the manager key and CA metadata into the network's keystore.
    SaveKeystore {
        #[arg(long)]
        password: Option<String>,
        /// Hex private key. Falls back to `CAWALLET_PRIVATE_KEY`.
        #[arg(long)]
        private_key: Option<String>,
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        ca_hash: String,
        #[arg(long)]
        ca_address: String,
        #[arg(long)]
        origin_chain_id: Option<String>,
    },

    /// Check that the keystore opens with this password.
    Unlock {
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget any unlocked wallet.
    Lock,

    WalletStatus,

    /// Call a read-only contract method.
    CallView {
        #[arg(long = "chain")]
        chain_id: String,
        #[arg(long)]
        contract_address: String,
        #[arg(long)]
        method_name: String,
        #[arg(long, default_value = "{}")]
        args: String,
    },

    Balance {
        #[arg(long = "chain")]
        chain_id: String,
        #[arg(long)]
        symbol: String,
        /// Defaults to the keystore's CA address.
        #[arg(long)]
        owner: Option<String>,
    },

    TxResult {
        #[arg(long = "chain")]
        chain_id: String,
        #[arg(long)]
        transaction_id: String,
    },

    /// Chain descriptors for the network.
    ChainInfo {
        /// Drop the cached descriptors first.
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },

    /// Cross-chain transfers that never reached `completed`.
    PendingTransfers,

    /// Print resolved paths.
    Paths,
}

fn init_logging(paths: &CaPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("cawallet.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn parse_json_arg(flag: &str, raw: &str) -> Result<Value, CaError> {
    serde_json::from_str(raw).map_err(|e| CaError::InvalidArgument(format!("--{flag}: {e}")))
}

fn password_or_prompt(password: Option<String>) -> eyre::Result<SecretString> {
    match password {
        Some(p) => Ok(SecretString::new(p.into())),
        None => prompt_password("Keystore password: "),
    }
}

/// Unlock for the duration of one write command. Without a password or a terminal, signing
/// falls back to the environment key.
fn unlock_for_command(
    toolkit: &Toolkit,
    session: &mut Session,
    network: Option<NetworkMode>,
    auth: PasswordArg,
) -> eyre::Result<()> {
    let password = match auth.password {
        Some(p) => SecretString::new(p.into()),
        None if toolkit.keystore_exists(network) && std::io::stdin().is_terminal() => {
            prompt_password("Keystore password: ")?
        }
        None => return Ok(()),
    };
    toolkit.unlock(session, &password, network)?;
    Ok(())
}

fn guardian_params(
    g: GuardianArgs,
    network: Option<NetworkMode>,
) -> eyre::Result<(GuardianParams, PasswordArg)> {
    let approved = parse_json_arg("guardians-approved", &g.guardians_approved)?;
    let guardians_approved = match approved {
        Value::Array(items) => items,
        Value::Null
        | Value::Bool(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Object(_) => {
            return Err(CaError::InvalidArgument(
                "--guardians-approved must be a JSON array".to_owned(),
            )
            .into())
        }
    };
    Ok((
        GuardianParams {
            chain_id: g.chain_id,
            guardian: parse_json_arg("guardian", &g.guardian)?,
            guardians_approved,
            network,
        },
        g.auth,
    ))
}

async fn run_command(cmd: WalletCommand, network: Option<NetworkMode>) -> eyre::Result<()> {
    let toolkit = Toolkit::open()?;
    let mut session = Session::new();
    match cmd {
        WalletCommand::Transfer {
            chain_id,
            to,
            token,
            auth,
        } => {
            unlock_for_command(&toolkit, &mut session, network, auth)?;
            let p = TransferParams {
                chain_id,
                to,
                token: token.into(),
                network,
            };
            print_json(&toolkit.transfer(&session, &p).await?)
        }
        WalletCommand::CrossChainTransfer {
            chain_id,
            to_chain_id,
            to,
            token,
            issue_chain_id,
            auth,
        } => {
            unlock_for_command(&toolkit, &mut session, network, auth)?;
            let p = CrossChainParams {
                chain_id,
                transfer: CrossChainTransferParams {
                    to,
                    to_chain_id,
                    token: token.into(),
                    issue_chain_id,
                },
                network,
            };
            print_json(&toolkit.cross_chain_transfer(&session, &p).await?)
        }
        WalletCommand::RecoverStuckTransfer {
            chain_id,
            token,
            auth,
        } => {
            unlock_for_command(&toolkit, &mut session, network, auth)?;
            let p = RecoverParams {
                chain_id,
                token: token.into(),
                network,
            };
            print_json(&toolkit.recover_stuck_transfer(&session, &p).await?)
        }
        WalletCommand::AddGuardian(g) => {
            let (p, auth) = guardian_params(g, network)?;
            unlock_for_command(&toolkit, &mut session, network, auth)?;
            print_json(
                &toolkit
                    .change_guardian(&session, GuardianChange::Add, &p)
                    .await?,
            )
        }
        WalletCommand::RemoveGuardian(g) => {
            let (p, auth) = guardian_params(g, network)?;
            unlock_for_command(&toolkit, &mut session, network, auth)?;
            print_json(
                &toolkit
                    .change_guardian(&session, GuardianChange::Remove, &p)
                    .await?,
            )
        }
        WalletCommand::ForwardCall {
            chain_id,
            contract_address,
            method_name,
            args,
            ca_hash,
            auth,
        } => {
            let args = parse_json_arg("args", &args)?;
            unlock_for_command(&toolkit, &mut session, network, auth)?;
            let p = ForwardCallParams {
                chain_id,
                contract_address,
                method_name,
                args,
                ca_hash,
                network,
            };
            print_json(&toolkit.forward_call(&session, &p).await?)
        }
        WalletCommand::SaveKeystore {
            password,
            private_key,
            mnemonic,
            ca_hash,
            ca_address,
            origin_chain_id,
        } => {
            let private_key = private_key
                .or_else(|| std::env::var(PRIVATE_KEY_ENV).ok())
                .ok_or(CaError::RequiredFieldMissing("privateKey"))?;
            let req = SaveKeystoreRequest {
                password: password_or_prompt(password)?,
                private_key: Zeroizing::new(private_key),
                mnemonic: Zeroizing::new(mnemonic),
                ca_hash,
                ca_address,
                origin_chain_id: origin_chain_id.unwrap_or_default(),
                network,
            };
            print_json(&toolkit.save_keystore(&mut session, req)?)
        }
        WalletCommand::Unlock { password } => {
            let password = password_or_prompt(password)?;
            print_json(&toolkit.unlock(&mut session, &password, network)?)
        }
        WalletCommand::Lock => {
            let was_unlocked = Toolkit::lock(&mut session);
            print_json(&json!({ "locked": true, "wasUnlocked": was_unlocked }))
        }
        WalletCommand::WalletStatus => print_json(&toolkit.wallet_status(&session, network)?),
        WalletCommand::CallView {
            chain_id,
            contract_address,
            method_name,
            args,
        } => {
            let p = CallViewParams {
                chain_id,
                contract_address,
                method_name,
                args: parse_json_arg("args", &args)?,
                network,
            };
            print_json(&toolkit.call_view(&p).await?)
        }
        WalletCommand::Balance {
            chain_id,
            symbol,
            owner,
        } => {
            let p = BalanceParams {
                chain_id,
                symbol,
                owner,
                network,
            };
            print_json(&toolkit.balance(&session, &p).await?)
        }
        WalletCommand::TxResult {
            chain_id,
            transaction_id,
        } => {
            let p = TxResultParams {
                chain_id,
                transaction_id,
                network,
            };
            print_json(&toolkit.tx_result(&p).await?)
        }
        WalletCommand::ChainInfo { refresh } => print_json(&toolkit.chain_info(network, refresh).await?),
        WalletCommand::PendingTransfers => print_json(&toolkit.pending_transfers()?),
        WalletCommand::Paths => print_json(&toolkit.paths_json()),
    }
}

async fn run(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;
    let paths = CaPaths::discover()?;
    paths.ensure_private_dirs().context("create cawallet home")?;
    let _log_guard = init_logging(&paths);
    let network: Option<NetworkMode> = cli.network.map(Into::into);

    match cli.cmd {
        Command::Mcp => {
            let label = network.map_or("configured", NetworkMode::as_str);
            print_mcp_banner(env!("CARGO_PKG_VERSION"), label);
            rpc::mcp_server::run(network)
                .await
                .context("mcp server failed")
        }
        Command::CreateWallet => print_json(&Toolkit::create_wallet()?),
        Command::Wallet(cmd) => run_command(cmd, network).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&ToolError::from_report(&e));
            ExitCode::FAILURE
        }
    }
}
