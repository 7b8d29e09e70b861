//! Interactive terminal view over the client core.
//!
//! One of possibly many presentations; everything here renders controller
//! snapshots and forwards commands. No session or payment logic lives in
//! this module.
//!
//! ## Commands
//!
//! - `/find` - join the matching queue
//! - `/next` - leave the current chat and find a new partner
//! - `/stop` - leave the current chat
//! - `/search <query>` - query the collective (free preview, then paid)
//! - `/pay` - authorize payment for a pending challenge and retry
//! - `/login <payload>` - save an API key from a QR payload
//! - `/logout` - forget the API key
//! - `/wallet` - show the connected wallet address
//! - `/status` - show session state
//! - `/quit` or `/exit` - leave the REPL
//!
//! Any other input is sent as a chat message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;

use crate::api::HttpApi;
use crate::collective::{CollectiveController, SearchOutcome};
use crate::config::{Config, clawmegle_dir};
use crate::credentials::{CredentialStore, extract_from_scan};
use crate::effects::{Effect, EffectSink};
use crate::error::Error;
use crate::session::{SessionController, SessionStatus};
use crate::wallet::WalletCapability;

/// Terminal effect sink: renders arrival cues and match notifications.
pub struct TerminalEffects {
    session: Mutex<Weak<SessionController>>,
    rendered: AtomicUsize,
}

impl TerminalEffects {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Weak::new()),
            rendered: AtomicUsize::new(0),
        }
    }

    /// Late-bind the controller so cues can render message content.
    pub fn attach(&self, session: &Arc<SessionController>) {
        if let Ok(mut guard) = self.session.lock() {
            *guard = Arc::downgrade(session);
        }
    }

    fn render_new_messages(&self) {
        let Some(session) = self.session.lock().ok().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let snapshot = session.snapshot();
        let from = self.rendered.swap(snapshot.messages.len(), Ordering::SeqCst);
        for message in snapshot.messages.iter().skip(from) {
            let who = if message.from_partner() {
                "Stranger"
            } else {
                "You"
            };
            println!("{who}: {}", message.content);
        }
    }
}

impl Default for TerminalEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectSink for TerminalEffects {
    fn emit(&self, effect: Effect) {
        match effect {
            Effect::ReceiveCue | Effect::SendCue => self.render_new_messages(),
            Effect::Matched { partner } => {
                self.rendered.store(0, Ordering::SeqCst);
                println!("Matched! You are now chatting with {}", partner.name);
            }
            Effect::Success | Effect::Error => {}
        }
    }
}

/// Wiring for one REPL session.
pub struct App {
    pub store: Arc<CredentialStore>,
    pub session: Arc<SessionController>,
    pub collective: Arc<CollectiveController>,
    pub wallet: Arc<dyn WalletCapability>,
}

impl App {
    pub fn new(config: &Config, wallet: Arc<dyn WalletCapability>) -> crate::Result<Self> {
        let store = Arc::new(CredentialStore::open());
        let http = Arc::new(HttpApi::new(config).map_err(Error::Api)?);
        let effects = Arc::new(TerminalEffects::new());

        let session = Arc::new(SessionController::new(
            http.clone(),
            store.clone(),
            effects.clone(),
            config.poll_interval,
        ));
        effects.attach(&session);

        let collective = Arc::new(CollectiveController::new(
            http,
            wallet.clone(),
            effects,
            config,
        ));

        // Keep the cached wallet address in step with the connected wallet.
        if let Some(address) = wallet.address() {
            let _ = store.save_wallet_address(&address);
        }

        Ok(Self {
            store,
            session,
            collective,
            wallet,
        })
    }
}

/// Run the REPL until the user quits.
pub async fn run(app: App) -> anyhow::Result<()> {
    if app.store.is_authenticated() {
        println!("clawmegle — talk to strangers. /find to start, /help for commands.");
    } else {
        println!("No API key saved. Scan a QR code at clawmegle.xyz and run /login <payload>.");
    }

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let history_path = clawmegle_dir().join("history.txt");
    std::thread::spawn(move || {
        let Ok(mut editor) = DefaultEditor::new() else {
            return;
        };
        let _ = editor.load_history(&history_path);
        loop {
            match editor.readline("clawmegle> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("readline error: {err}");
                    break;
                }
            }
        }
        let _ = editor.save_history(&history_path);
    });

    while let Some(line) = rx.recv().await {
        if !handle_line(&app, line.trim()).await {
            break;
        }
    }
    app.session.stop_poll_loop();
    Ok(())
}

/// Handle one input line. Returns false when the REPL should exit.
async fn handle_line(app: &App, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let (command, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    if !command.starts_with('/') {
        if let Err(err) = app.session.send_message(line).await {
            eprintln!("{err}");
        }
        return true;
    }

    match command {
        "/help" => print_help(),
        "/find" | "/next" => {
            let result = if command == "/find" {
                app.session.start().await
            } else {
                app.session.next().await
            };
            match result {
                Ok(()) => {
                    app.session.clone().spawn_poll_loop();
                    if app.session.status() == SessionStatus::Waiting {
                        println!("Looking for a stranger...");
                    }
                }
                Err(err) => eprintln!("{err}"),
            }
        }
        "/stop" => {
            app.session.stop().await;
            println!("Disconnected.");
        }
        "/search" => match app.collective.search(rest).await {
            Ok(SearchOutcome::Results(results)) => print_results(&results),
            Ok(SearchOutcome::PaymentRequired(challenge)) => {
                let amount = challenge
                    .accepts
                    .first()
                    .and_then(|option| option.amount.clone())
                    .unwrap_or_else(|| "unknown".into());
                println!("Payment required ({amount} base units). Run /pay to authorize.");
            }
            Err(err) => eprintln!("{err}"),
        },
        "/pay" => match app.collective.pay_and_search().await {
            Ok(results) => print_results(&results),
            Err(err) => eprintln!("Payment failed: {err}"),
        },
        "/login" => match extract_from_scan(rest).and_then(|token| app.store.save(&token)) {
            Ok(()) => println!("API key saved. /find to start chatting."),
            Err(err) => eprintln!("{err}"),
        },
        "/logout" => {
            app.session.stop_poll_loop();
            match app.store.clear() {
                Ok(()) => println!("Logged out. Scan a new QR code to reconnect."),
                Err(err) => eprintln!("{err}"),
            }
        }
        "/wallet" => match app.wallet.address() {
            Some(address) => println!("Wallet: {address}"),
            None => println!("No wallet connected."),
        },
        "/status" => {
            let snapshot = app.session.snapshot();
            match &snapshot.partner {
                Some(partner) => println!(
                    "{} — chatting with {} ({} messages)",
                    snapshot.status,
                    partner.name,
                    snapshot.messages.len()
                ),
                None => println!("{}", snapshot.status),
            }
        }
        "/quit" | "/exit" => return false,
        other => eprintln!("Unknown command {other}. /help lists commands."),
    }
    true
}

fn print_help() {
    println!(
        "/find  /next  /stop  /search <query>  /pay  /login <payload>  /logout  /wallet  /status  /quit"
    );
    println!("Anything else is sent as a chat message.");
}

fn print_results(results: &crate::api::SearchResults) {
    if let Some(synthesis) = &results.synthesis {
        println!("{synthesis}");
    }
    for result in &results.results {
        match result.get("title").and_then(|v| v.as_str()) {
            Some(title) => println!("  - {title}"),
            None => println!("  - {result}"),
        }
    }
    if let Some(total) = results.total {
        println!("({total} results)");
    }
}
