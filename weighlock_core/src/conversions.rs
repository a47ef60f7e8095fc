//! `From` implementations bridging `weighlock_config` types to `weighlock_core` types.

use weighlock_traits::{Level, Rgb};

use crate::animation::Pacing;
use crate::config::{
    AnimationCfg, LatchCfg, Palette, RejectCfg, RetryPolicy, ScaleCfg, SessionCfg, StabilityCfg,
};

// ── ScaleCfg ─────────────────────────────────────────────────────────────────

impl From<&weighlock_config::ScaleCfg> for ScaleCfg {
    fn from(c: &weighlock_config::ScaleCfg) -> Self {
        Self {
            scale_factor: c.scale_factor,
            window: c.window,
            tare_samples: c.tare_samples,
            target_samples: c.target_samples,
            burst_samples: c.burst_samples,
            idle_threshold: c.idle_threshold,
            not_ready_backoff_ms: c.not_ready_backoff_ms,
        }
    }
}

// ── StabilityCfg ─────────────────────────────────────────────────────────────

impl From<&weighlock_config::StabilityCfg> for StabilityCfg {
    fn from(c: &weighlock_config::StabilityCfg) -> Self {
        Self {
            equilibrium: c.equilibrium,
            changing: c.changing,
            tolerance: c.tolerance,
            settle_timeout_ms: c.settle_timeout_ms,
        }
    }
}

// ── AnimationCfg ─────────────────────────────────────────────────────────────

impl From<weighlock_config::Pacing> for Pacing {
    fn from(p: weighlock_config::Pacing) -> Self {
        match p {
            weighlock_config::Pacing::WallClock => Pacing::WallClock,
            weighlock_config::Pacing::Frames => Pacing::Frames,
        }
    }
}

impl From<&weighlock_config::AnimationCfg> for AnimationCfg {
    fn from(c: &weighlock_config::AnimationCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            frame_ms: c.frame_ms,
            max_brightness: c.max_brightness,
            pacing: c.pacing.into(),
        }
    }
}

// ── LatchCfg / RejectCfg ─────────────────────────────────────────────────────

impl From<&weighlock_config::LatchCfg> for LatchCfg {
    fn from(c: &weighlock_config::LatchCfg) -> Self {
        Self {
            pulse_ms: c.pulse_ms,
            max_pulse_ms: c.max_pulse_ms,
            rerelease_interval_ms: c.rerelease_interval_ms,
        }
    }
}

impl From<&weighlock_config::RejectCfg> for RejectCfg {
    fn from(c: &weighlock_config::RejectCfg) -> Self {
        Self {
            flashes: c.flashes,
            on_ms: c.on_ms,
            off_ms: c.off_ms,
        }
    }
}

// ── Palette ──────────────────────────────────────────────────────────────────

fn rgb([r, g, b]: [u8; 3]) -> Rgb {
    Rgb::new(r, g, b)
}

impl From<&weighlock_config::ColorsCfg> for Palette {
    fn from(c: &weighlock_config::ColorsCfg) -> Self {
        Self {
            taring: rgb(c.taring),
            learning: rgb(c.learning),
            weighing: rgb(c.weighing),
            unlocked: rgb(c.unlocked),
            rejected: rgb(c.rejected),
        }
    }
}

// ── SessionCfg ───────────────────────────────────────────────────────────────

impl From<weighlock_config::RetryPolicy> for RetryPolicy {
    fn from(p: weighlock_config::RetryPolicy) -> Self {
        match p {
            weighlock_config::RetryPolicy::Rearm => RetryPolicy::Rearm,
            weighlock_config::RetryPolicy::Terminate => RetryPolicy::Terminate,
        }
    }
}

impl From<&weighlock_config::SessionCfg> for SessionCfg {
    fn from(c: &weighlock_config::SessionCfg) -> Self {
        Self {
            retry_policy: c.retry_policy.into(),
            wait_timeout_ms: c.wait_timeout_ms,
            pressed: Level::from(c.button_active_high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_map_across() {
        let cfg = weighlock_config::load_toml(
            r#"
            [pins]
            hx711_dt = 5
            hx711_sck = 6
            led_red = 12
            led_green = 13
            led_blue = 19
            button = 17
            latch = 27

            [session]
            retry_policy = "terminate"
            button_active_high = false

            [colors]
            weighing = [1, 2, 3]
            "#,
        )
        .unwrap();
        let session = SessionCfg::from(&cfg.session);
        assert_eq!(session.retry_policy, RetryPolicy::Terminate);
        assert_eq!(session.pressed, Level::Low);
        let palette = Palette::from(&cfg.colors);
        assert_eq!(palette.weighing, Rgb::new(1, 2, 3));
        assert_eq!(palette.unlocked, Rgb::GREEN);
        let scale = ScaleCfg::from(&cfg.scale);
        assert_eq!(scale.window, 10);
    }
}
