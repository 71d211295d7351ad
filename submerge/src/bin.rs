//! The `submerge` node process: loads a Realm configuration, starts every
//! configured replica in-process behind a shared loopback transport, and
//! either sits idle (for use from tests/scripts via the library) or opens
//! the admin viewer.

use std::path::PathBuf;

use clap::Parser;

use submerge::{Config, Realm};
use submerge_net::NodeID;
use submerge_ui::UiContext;

#[derive(Parser)]
#[command(name = "submerge", about = "A quorum-locked distributed key-value node")]
struct Args {
    /// Path to a TOML Realm configuration. Defaults to a 3-primary, W=2 demo cluster.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Open the terminal admin viewer instead of just starting the Realm and idling.
    #[arg(long)]
    ui: bool,

    /// Node identity to use as the coordinator when --ui is given.
    #[arg(long, default_value_t = 0)]
    coordinator_node: u64,
}

fn main() -> submerge_base::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(submerge_base::Error::from)?;
            Config::from_toml_str(&text)?
        }
        None => Config::default(),
    };

    let realm = Realm::start(&config);

    if args.ui {
        let ctx = UiContext {
            nodes: realm.membership.all_nodes(),
            transport: realm.transport.clone(),
            deadline: realm.deadline,
        };
        submerge_ui::run_ui(ctx).map_err(submerge_base::Error::from)?;
    } else {
        tracing::info!(coordinator_node = args.coordinator_node, "realm running headless; press ctrl-c to exit");
        let _coordinator = realm.coordinator(NodeID(args.coordinator_node));
        loop {
            std::thread::park();
        }
    }

    Ok(())
}
