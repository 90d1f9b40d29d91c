#![no_main]
use libfuzzer_sys::fuzz_target;
use lockstep_core::Command;

fuzz_target!(|data: &str| {
    // Display must print a form that parses back to the same command.
    if let Ok(cmd) = data.parse::<Command>() {
        assert_eq!(cmd.to_string().parse::<Command>(), Ok(cmd));
    }
});
