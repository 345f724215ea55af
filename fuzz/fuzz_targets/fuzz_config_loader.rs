#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = heatctl_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        for h in &cfg.heaters {
            let _ = heatctl_core::build_controller(h, Default::default());
        }
    }
});
