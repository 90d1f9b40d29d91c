#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse, validate and convert must reject bad input without panicking.
    let Ok(cfg) = toml::from_str::<lockstep_config::Config>(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let _ = lockstep_core::ControllerParameters::try_from(&cfg.control);
    }
});
