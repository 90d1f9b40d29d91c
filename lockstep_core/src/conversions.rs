//! Conversions bridging `lockstep_config` types to `lockstep_core` types.

use std::time::Duration;

use eyre::WrapErr;

use crate::config::ControllerParameters;
use crate::fixed_point::Decimal;
use crate::session::SessionCfg;

fn decimal(name: &str, v: &lockstep_config::DecimalText) -> eyre::Result<Decimal> {
    v.as_str()
        .parse::<Decimal>()
        .wrap_err_with(|| format!("control.{name}"))
}

// ── ControllerParameters ─────────────────────────────────────────────────────

impl TryFrom<&lockstep_config::ControlCfg> for ControllerParameters {
    type Error = eyre::Report;

    fn try_from(c: &lockstep_config::ControlCfg) -> Result<Self, Self::Error> {
        Ok(Self {
            gain: decimal("gain", &c.gain)?,
            limits: [decimal("limit_a", &c.limit_a)?, decimal("limit_b", &c.limit_b)?],
            closed_loop: c.closed_loop,
            velocity: [
                decimal("velocity_a", &c.velocity_a)?,
                decimal("velocity_b", &c.velocity_b)?,
            ],
            output_relation: decimal("output_relation", &c.output_relation)?,
            simultaneous: c.simultaneous,
            wheel_steps: c.wheel_steps,
        }
        .normalized())
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl From<&lockstep_config::Timeouts> for SessionCfg {
    fn from(t: &lockstep_config::Timeouts) -> Self {
        Self {
            tick_timeout: Duration::from_millis(t.tick_ms.max(1)),
            max_ticks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_config::load_toml;

    #[test]
    fn control_section_converts_exactly() {
        let cfg = load_toml(
            r#"
[control]
wheel_steps = 0
gain = "1.0"
limit_a = "0.5"
velocity_a = 55
closed_loop = true
"#,
        )
        .unwrap();
        let p = ControllerParameters::try_from(&cfg.control).unwrap();
        assert_eq!(p.wheel_steps, 1);
        assert_eq!(p.gain, Decimal::ONE);
        assert_eq!(p.limits[0].to_string(), "0.500");
        assert_eq!(p.output_relation.to_string(), "110.00");
        assert_eq!(p.feed_forward(lockstep_traits::Axis::A).to_string(), "0.500000");
        assert!(p.closed_loop);
    }

    #[test]
    fn long_fractions_are_truncated() {
        let mut c = lockstep_config::ControlCfg::default();
        c.velocity_a = lockstep_config::DecimalText::new("60.000000000000000000000000000");
        c.limit_b = lockstep_config::DecimalText::new("0.5559");
        let p = ControllerParameters::try_from(&c).unwrap();
        assert_eq!(p.velocity[0].scale(), 2);
        assert_eq!(p.limits[1].to_string(), "0.555");
    }

    #[test]
    fn malformed_decimal_names_the_field() {
        let mut c = lockstep_config::ControlCfg::default();
        c.gain = lockstep_config::DecimalText::new("1,5");
        let err = ControllerParameters::try_from(&c).unwrap_err();
        assert!(format!("{err:#}").contains("control.gain"));
    }

    #[test]
    fn timeouts_map_to_session() {
        let t = lockstep_config::Timeouts { tick_ms: 250 };
        assert_eq!(SessionCfg::from(&t).tick_timeout, Duration::from_millis(250));
    }
}
