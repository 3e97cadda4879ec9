use bluepay::application::dispatcher::ChannelDispatcher;
use bluepay::application::draft::Field;
use bluepay::application::expiry_watch::ExpiryWatch;
use bluepay::application::token_lifecycle::TokenLifecycleManager;
use bluepay::application::verification::{TokenVerifier, Verification};
use bluepay::config::{ClientConfig, DEFAULT_GATEWAY_URL};
use bluepay::domain::money::Amount;
use bluepay::domain::ports::{Clock, SharedClock, SharedGateway};
use bluepay::domain::token::{PaymentToken, Receiver, TokenId};
use bluepay::domain::transfer::{Channel, KNOWN_BANKS, Pin, SendMoneyResult};
use bluepay::infrastructure::clock::SystemClock;
use bluepay::infrastructure::http::HttpGateway;
use bluepay::interfaces::json::payload::encode_payload;
use bluepay::logging::{LogFormat, init_logging};
use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, bail};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the payment gateway API
    #[arg(long, global = true, env = "BLUEPAY_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    /// Bearer token of the signed-in session
    #[arg(long, global = true, env = "BLUEPAY_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Seconds to wait for the gateway before giving up
    #[arg(long, global = true, env = "BLUEPAY_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long, global = true, env = "BLUEPAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a payment request code and print its payload
    Qr {
        /// Phone number payments are credited to
        #[arg(long)]
        phone: String,

        /// Name shown to the payer
        #[arg(long)]
        name: String,

        /// Requested amount in Rwf. Omit to let the payer choose.
        #[arg(long)]
        amount: Option<String>,

        /// Note shown to the payer
        #[arg(long)]
        message: Option<String>,

        /// Keep running and print a new payload each time the code is renewed
        #[arg(long)]
        watch: bool,
    },
    /// Send money on one of the payment rails
    Send {
        #[arg(long, value_enum, default_value_t = ChannelArg::Wallet)]
        channel: ChannelArg,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        bank_name: Option<String>,

        #[arg(long)]
        account_number: Option<String>,

        #[arg(long)]
        amount: String,

        #[arg(long, env = "BLUEPAY_PIN", hide_env_values = true)]
        pin: String,

        #[arg(long)]
        note: Option<String>,
    },
    /// Show the wallet balance
    Balance,
    /// Check a scanned payment code
    Verify {
        /// The payload as scanned
        payload: String,
    },
    /// Pay a scanned payment code from the wallet
    Pay {
        /// The payload as scanned
        payload: String,

        /// Amount in Rwf. Required when the code does not fix one.
        #[arg(long)]
        amount: Option<String>,

        #[arg(long, env = "BLUEPAY_PIN", hide_env_values = true)]
        pin: String,

        #[arg(long)]
        note: Option<String>,
    },
    /// List the banks offered for bank transfers
    Banks,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelArg {
    Wallet,
    MobileMoney,
    Bank,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Wallet => Channel::Wallet,
            ChannelArg::MobileMoney => Channel::MobileMoney,
            ChannelArg::Bank => Channel::BankTransfer,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("warn", cli.log_format);

    let config = ClientConfig {
        gateway_url: cli.gateway_url,
        auth_token: cli.auth_token,
        gateway_timeout: Duration::from_secs(cli.timeout_secs),
        ..Default::default()
    };
    let gateway: SharedGateway = Arc::new(HttpGateway::new(&config).into_diagnostic()?);
    let clock: SharedClock = Arc::new(SystemClock);

    match cli.command {
        Command::Qr {
            phone,
            name,
            amount,
            message,
            watch,
        } => {
            let amount = amount
                .as_deref()
                .map(Amount::parse)
                .transpose()
                .into_diagnostic()?;
            let manager = Arc::new(TokenLifecycleManager::new(
                gateway,
                Arc::clone(&clock),
                Receiver::new(phone, name),
                config.token_policy(),
            ));

            if amount.is_some() || message.is_some() {
                manager.set_request(amount, message).await;
            } else {
                manager.regenerate().await;
            }
            let Some(token) = manager.current_token().await else {
                bail!("no payment code could be produced");
            };
            show_token(&token, clock.as_ref())?;

            if watch {
                watch_tokens(&manager, &config, token.token_id().clone(), clock.as_ref()).await?;
            }
        }
        Command::Send {
            channel,
            phone,
            bank_name,
            account_number,
            amount,
            pin,
            note,
        } => {
            if let Some(bank) = bank_name.as_deref()
                && !KNOWN_BANKS.iter().any(|known| known.eq_ignore_ascii_case(bank.trim()))
            {
                eprintln!("warning: {bank} is not one of the listed banks");
            }
            let dispatcher = ChannelDispatcher::new(gateway, config.gateway_timeout);
            dispatcher.select_channel(channel.into()).await.into_diagnostic()?;

            let fields = [
                (Field::Phone, phone),
                (Field::BankName, bank_name),
                (Field::AccountNumber, account_number),
                (Field::Amount, Some(amount)),
                (Field::Note, note),
                (Field::Pin, Some(pin)),
            ];
            for (field, value) in fields {
                if let Some(value) = value {
                    dispatcher.update_field(field, &value).await.into_diagnostic()?;
                }
            }

            let result = dispatcher.submit().await.into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            if let SendMoneyResult::Failure(failure) = result {
                bail!("{} ({})", failure.message, failure.reason_code);
            }
        }
        Command::Balance => {
            let dispatcher = ChannelDispatcher::new(gateway, config.gateway_timeout);
            let balance = dispatcher.refresh_balance().await.into_diagnostic()?;
            println!("{balance}");
        }
        Command::Verify { payload } => {
            let verifier = TokenVerifier::new(gateway, clock, config.gateway_timeout);
            let verdict = verifier.verify(&payload).await.into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&verdict).into_diagnostic()?);
            if let Verification::Rejected { reason } = verdict {
                bail!("payment code rejected: {reason}");
            }
        }
        Command::Pay {
            payload,
            amount,
            pin,
            note,
        } => {
            let amount = amount
                .as_deref()
                .map(Amount::parse)
                .transpose()
                .into_diagnostic()?;
            let verifier = TokenVerifier::new(gateway, clock, config.gateway_timeout);
            let result = verifier
                .pay(&payload, amount, Pin::sanitize(&pin), note)
                .await
                .into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            if let SendMoneyResult::Failure(failure) = result {
                bail!("{} ({})", failure.message, failure.reason_code);
            }
        }
        Command::Banks => {
            for bank in KNOWN_BANKS {
                println!("{bank}");
            }
        }
    }

    Ok(())
}

fn show_token(token: &PaymentToken, clock: &dyn Clock) -> Result<()> {
    println!("{}", encode_payload(token).into_diagnostic()?);
    if !token.is_verified() {
        eprintln!("warning: gateway unreachable, this code is unsigned and cannot be verified");
    }
    eprintln!("expires in {}", token.time_remaining(clock.now()));
    Ok(())
}

async fn watch_tokens(
    manager: &Arc<TokenLifecycleManager>,
    config: &ClientConfig,
    mut shown: TokenId,
    clock: &dyn Clock,
) -> Result<()> {
    let _watch = ExpiryWatch::spawn(Arc::clone(manager), config.tick_interval);
    let mut ticker = tokio::time::interval(config.tick_interval);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.into_diagnostic()?;
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Some(token) = manager.current_token().await
                    && token.token_id() != &shown
                {
                    show_token(&token, clock)?;
                    shown = token.token_id().clone();
                }
            }
        }
    }
}
