//! Fuzz test for configuration file parsing
//!
//! Arbitrary TOML must never panic the parser or the validator.

#![no_main]

use libfuzzer_sys::fuzz_target;
use xorshard_cli::config::Config;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<Config>(s) {
            let _ = config.validate();
            let _ = config.job_options();
        }
    }
});
