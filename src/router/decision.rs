use image::GrayImage;
use tracing::debug;

use crate::config::RouterConfig;
use crate::core::{RouterSnapshot, RoutingDecision};

use super::signals::{self, CpuSampler, NetworkProbe, RollingAverage};

/// Combines rolling quality/compute/network signals into a routing decision.
///
/// Samples are pushed every frame; the decision is only (re-)computed on
/// request, typically once per frame from the capture loop.
pub struct Router {
    config: RouterConfig,
    brightness: RollingAverage,
    blur_var: RollingAverage,
    cpu_pct: RollingAverage,
    net_latency_ms: RollingAverage,
    cpu_sampler: CpuSampler,
    network_probe: NetworkProbe,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        let network_probe = NetworkProbe::new(config.cloud_health_url.clone());
        Self {
            config,
            brightness: RollingAverage::default(),
            blur_var: RollingAverage::default(),
            cpu_pct: RollingAverage::default(),
            net_latency_ms: RollingAverage::default(),
            cpu_sampler: CpuSampler::new(),
            network_probe,
        }
    }

    /// Sample all four signals for the current frame and push into history.
    pub fn observe(&mut self, gray: &GrayImage) {
        self.brightness.push(signals::brightness(gray));
        self.blur_var.push(signals::blur_variance(gray));
        self.cpu_pct.push(self.cpu_sampler.sample());
        self.net_latency_ms.push(self.network_probe.sample());
    }

    /// Evaluate the decision table against current rolling averages.
    pub fn decide(&self) -> RouterSnapshot {
        let brightness = self.brightness.average();
        let blur_var = self.blur_var.average();
        let cpu_pct = self.cpu_pct.average();
        let net_latency_ms = self.net_latency_ms.average();

        let mut reasons = Vec::new();
        let low_brightness = brightness >= 0.0 && brightness < self.config.brightness_min;
        let blurry = blur_var >= 0.0 && blur_var < self.config.blur_var_min;
        let cpu_high = cpu_pct >= 0.0 && cpu_pct > self.config.cpu_high_pct;

        if low_brightness {
            reasons.push("low_brightness".to_string());
        }
        if blurry {
            reasons.push("blurry".to_string());
        }
        if cpu_high {
            reasons.push("cpu_high".to_string());
        }

        if !self.network_probe.is_configured() {
            reasons.push("net_unconfigured".to_string());
        } else if net_latency_ms < 0.0 {
            reasons.push("net_down".to_string());
        } else if net_latency_ms > self.config.net_slow_ms {
            reasons.push("net_slow".to_string());
        }

        let decision = if low_brightness && blurry {
            RoutingDecision::RecordOnly
        } else if cpu_high || blurry || low_brightness {
            RoutingDecision::RunCloud
        } else {
            RoutingDecision::RunLocal
        };

        debug!(?decision, ?reasons, "router decision computed");

        RouterSnapshot {
            brightness,
            blur_var,
            cpu_pct,
            net_latency_ms,
            decision,
            decision_reason: reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouterConfig {
        RouterConfig {
            brightness_min: 0.20,
            blur_var_min: 60.0,
            cpu_high_pct: 85.0,
            net_slow_ms: 250.0,
            cloud_health_url: String::new(),
        }
    }

    fn bright_sharp_image() -> GrayImage {
        let mut image = GrayImage::from_pixel(16, 16, image::Luma([200]));
        for y in 0..16 {
            for x in 0..16 {
                if (x + y) % 2 == 0 {
                    image.put_pixel(x, y, image::Luma([10]));
                }
            }
        }
        image
    }

    #[test]
    fn low_brightness_and_blurry_forces_record_only() {
        let mut router = Router::new(config());
        let dark_flat = GrayImage::from_pixel(16, 16, image::Luma([5]));
        for _ in 0..10 {
            router.observe(&dark_flat);
        }
        let snapshot = router.decide();
        assert_eq!(snapshot.decision, RoutingDecision::RecordOnly);
        assert!(snapshot.decision_reason.contains(&"low_brightness".to_string()));
        assert!(snapshot.decision_reason.contains(&"blurry".to_string()));
    }

    #[test]
    fn good_quality_and_idle_cpu_runs_local() {
        let mut router = Router::new(config());
        let image = bright_sharp_image();
        for _ in 0..10 {
            router.observe(&image);
        }
        let snapshot = router.decide();
        assert_eq!(snapshot.decision, RoutingDecision::RunLocal);
    }

    #[test]
    fn unconfigured_network_is_advisory_only() {
        let mut router = Router::new(config());
        let image = bright_sharp_image();
        for _ in 0..10 {
            router.observe(&image);
        }
        let snapshot = router.decide();
        assert!(snapshot.decision_reason.contains(&"net_unconfigured".to_string()));
        assert_eq!(snapshot.decision, RoutingDecision::RunLocal);
    }
}
