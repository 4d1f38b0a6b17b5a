use clap::Subcommand;
use verdant_core::focus::DistractionSites;

use super::{open_store, print_json, CliResult};

#[derive(Subcommand)]
pub enum SitesAction {
    /// List distraction sites
    List,
    /// Add a site
    Add {
        domain: String,
        /// Score penalty in [0, 1] applied on arrival
        #[arg(long, default_value = "0.1")]
        penalty: f64,
    },
    /// Remove a site
    Remove { domain: String },
    /// Re-enable a site
    Enable { domain: String },
    /// Keep a site listed but stop penalising it
    Disable { domain: String },
    /// Restore the built-in list
    Reset,
}

pub fn run(action: SitesAction) -> CliResult {
    let store = open_store()?;

    let (domain, changed) = match action {
        SitesAction::List => {
            let sites: DistractionSites = store.get()?;
            return print_json(&sites);
        }
        SitesAction::Reset => {
            store.reset::<DistractionSites>()?;
            println!("distraction sites reset to defaults");
            return Ok(());
        }
        SitesAction::Add { domain, penalty } => {
            if !(0.0..=1.0).contains(&penalty) {
                return Err(format!("penalty must be within [0, 1], got {penalty}").into());
            }
            let changed = store.update(|s: &mut DistractionSites| s.add(&domain, penalty))?;
            (domain, changed)
        }
        SitesAction::Remove { domain } => {
            let changed = store.update(|s: &mut DistractionSites| s.remove(&domain))?;
            (domain, changed)
        }
        SitesAction::Enable { domain } => {
            let changed = store.update(|s: &mut DistractionSites| s.set_enabled(&domain, true))?;
            (domain, changed)
        }
        SitesAction::Disable { domain } => {
            let changed = store.update(|s: &mut DistractionSites| s.set_enabled(&domain, false))?;
            (domain, changed)
        }
    };

    if changed {
        println!("ok");
    } else {
        eprintln!("no change for {domain}");
    }
    Ok(())
}
