//! Check command implementation.
//!
//! Validates configuration, the site snapshot and the options file.

use std::sync::Arc;

use slymetrics::clock::SystemClock;
use slymetrics::collectors::{collectors_for, CollectContext, CollectorSettings, Tier};
use slymetrics::config::{validate_effective_config, Config};
use slymetrics::host::{Host, SnapshotHost};
use slymetrics::secrets::{KeySource, SecretEnv, SecretKind, SecretStore};
use slymetrics::store::{FileOptionStore, MemoryTransientStore};

/// Validates configuration and the files it points at.
pub fn command_check(collectors: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 slymetrics - Configuration Check");
    println!("===================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📄 Checking site snapshot...");
    let provider = match &config.host_snapshot {
        Some(path) => match SnapshotHost::open(path) {
            Ok(host) => {
                println!("   ✅ Snapshot loaded from {}", path.display());
                Some(Arc::new(host))
            }
            Err(e) => {
                println!("   ❌ Snapshot {} unusable: {}", path.display(), e);
                all_ok = false;
                None
            }
        },
        None => {
            println!("   ⚠️  No host_snapshot configured, an empty site would be served");
            Some(Arc::new(SnapshotHost::empty()))
        }
    };

    println!("\n🔐 Checking options file...");
    let options_path = config.options_path();
    match FileOptionStore::open(&options_path) {
        Ok(store) => {
            println!("   ✅ Options file usable: {}", options_path.display());
            match SecretStore::new(Arc::new(store), SecretEnv::from_process()) {
                Ok(secrets) => {
                    match secrets.key_source() {
                        KeySource::Environment => println!("   ✅ Encryption key from environment"),
                        KeySource::Stored => println!("   ✅ Encryption key from options file"),
                        KeySource::Degraded => {
                            println!("   ⚠️  Encryption key unusable, secrets are only base64 encoded")
                        }
                    }
                    for kind in [SecretKind::BearerToken, SecretKind::ApiKey] {
                        if secrets.get(kind).is_some() {
                            println!("   ✅ {} configured", kind.label());
                        } else {
                            println!("   ⚠️  {} not set yet (generated on first start)", kind.label());
                        }
                    }
                }
                Err(e) => {
                    println!("   ❌ Secret store unusable: {}", e);
                    all_ok = false;
                }
            }
        }
        Err(e) => {
            println!("   ❌ Options file unusable: {}", e);
            all_ok = false;
        }
    }

    if collectors {
        if let Some(provider) = provider {
            println!("\n📊 Running collectors...");
            let host = Host::from_provider(provider);
            let transient = MemoryTransientStore::new(Arc::new(SystemClock));
            let settings = CollectorSettings::from_config(config);
            let ctx = CollectContext {
                host: &host,
                transient: &transient,
                settings: &settings,
            };
            for tier in Tier::ALL {
                for collector in collectors_for(tier) {
                    match collector.collect(&ctx) {
                        Ok(block) => println!(
                            "   ✅ [{}] {}: {} samples",
                            tier,
                            collector.name(),
                            block.sample_count()
                        ),
                        Err(e) => {
                            println!("   ❌ [{}] {}: {}", tier, collector.name(), e);
                            all_ok = false;
                        }
                    }
                }
            }
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the output above");
        std::process::exit(1);
    }
}
