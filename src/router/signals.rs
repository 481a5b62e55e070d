use std::collections::VecDeque;
use std::time::{Duration, Instant};

use image::GrayImage;
use tracing::{debug, trace, warn};

const ROLLING_WINDOW: usize = 10;
const NET_PROBE_MIN_INTERVAL: Duration = Duration::from_secs(2);
const NET_PROBE_TIMEOUT: Duration = Duration::from_millis(600);

/// Rolling 10-sample history of a single router input, ignoring negatives
/// (the sentinel used for "unavailable") when averaging.
#[derive(Debug, Default)]
pub struct RollingAverage {
    samples: VecDeque<f64>,
}

impl RollingAverage {
    pub fn push(&mut self, value: f64) {
        if self.samples.len() >= ROLLING_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn average(&self) -> f64 {
        let valid: Vec<f64> = self.samples.iter().copied().filter(|v| *v >= 0.0).collect();
        if valid.is_empty() {
            return -1.0;
        }
        valid.iter().sum::<f64>() / valid.len() as f64
    }
}

/// Mean grayscale pixel value, normalized to [0, 1].
pub fn brightness(gray: &GrayImage) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    (sum as f64 / gray.len() as f64) / 255.0
}

/// Laplacian-variance blur estimate: high variance means sharp edges, low
/// variance means a blurry (or blank) frame.
pub fn blur_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut laplacian = Vec::with_capacity((width * height) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray.get_pixel(x, y)[0] as i32;
            let up = gray.get_pixel(x, y - 1)[0] as i32;
            let down = gray.get_pixel(x, y + 1)[0] as i32;
            let left = gray.get_pixel(x - 1, y)[0] as i32;
            let right = gray.get_pixel(x + 1, y)[0] as i32;
            laplacian.push((up + down + left + right - 4 * center) as f64);
        }
    }
    if laplacian.is_empty() {
        return 0.0;
    }
    let mean = laplacian.iter().sum::<f64>() / laplacian.len() as f64;
    laplacian.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / laplacian.len() as f64
}

/// Differential CPU usage percentage read from `/proc/stat`.
///
/// The first sample (and any read failure) returns `-1.0` since there is no
/// prior reading to take a delta against.
pub struct CpuSampler {
    previous: Option<(u64, u64)>,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self { previous: None }
    }

    pub fn sample(&mut self) -> f64 {
        let Some((total, idle)) = read_proc_stat() else {
            return -1.0;
        };
        let Some((prev_total, prev_idle)) = self.previous.replace((total, idle)) else {
            return -1.0;
        };
        let dt = total.saturating_sub(prev_total);
        if dt == 0 {
            return -1.0;
        }
        let idle_delta = idle.saturating_sub(prev_idle) as f64;
        100.0 * (1.0 - idle_delta / dt as f64)
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn read_proc_stat() -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().next()?;
    let nums: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|p| p.parse().ok())
        .collect();
    if nums.len() < 4 {
        return None;
    }
    let idle = nums[3] + nums.get(4).copied().unwrap_or(0);
    let total: u64 = nums.iter().sum();
    Some((total, idle))
}

#[cfg(not(target_os = "linux"))]
fn read_proc_stat() -> Option<(u64, u64)> {
    None
}

/// Time-gated network probe: at most once every two seconds, bounded to
/// 600ms. Returns `-1.0` when unconfigured, unreachable, or timed out.
pub struct NetworkProbe {
    url: String,
    last_probe: Option<Instant>,
    last_value: f64,
}

impl NetworkProbe {
    pub fn new(url: String) -> Self {
        Self {
            url,
            last_probe: None,
            last_value: -1.0,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    pub fn sample(&mut self) -> f64 {
        if !self.is_configured() {
            return -1.0;
        }
        if let Some(last) = self.last_probe {
            if last.elapsed() < NET_PROBE_MIN_INTERVAL {
                return self.last_value;
            }
        }
        self.last_probe = Some(Instant::now());
        self.last_value = probe_once(&self.url);
        trace!(url = %self.url, latency_ms = self.last_value, "network probe sampled");
        self.last_value
    }
}

fn probe_once(url: &str) -> f64 {
    let started = Instant::now();
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(NET_PROBE_TIMEOUT)
        .timeout(NET_PROBE_TIMEOUT)
        .build();
    match agent.get(url).call() {
        Ok(_) => started.elapsed().as_secs_f64() * 1000.0,
        // A reachable server answering with a non-2xx status still proves the
        // link is up within budget; only a connect/timeout failure means "down".
        Err(ureq::Error::Status(_, _)) => started.elapsed().as_secs_f64() * 1000.0,
        Err(err) => {
            debug!(url, error = %err, "network probe failed");
            -1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_average_ignores_negative_samples() {
        let mut avg = RollingAverage::default();
        avg.push(10.0);
        avg.push(-1.0);
        avg.push(20.0);
        assert_eq!(avg.average(), 15.0);
    }

    #[test]
    fn rolling_average_of_all_negative_is_negative() {
        let mut avg = RollingAverage::default();
        avg.push(-1.0);
        avg.push(-1.0);
        assert_eq!(avg.average(), -1.0);
    }

    #[test]
    fn rolling_average_caps_at_window() {
        let mut avg = RollingAverage::default();
        for i in 0..20 {
            avg.push(i as f64);
        }
        assert_eq!(avg.samples.len(), ROLLING_WINDOW);
    }

    #[test]
    fn cpu_sampler_first_read_is_negative_one() {
        let mut sampler = CpuSampler::new();
        assert_eq!(sampler.sample(), -1.0);
    }

    #[test]
    fn network_probe_unconfigured_returns_negative_one() {
        let mut probe = NetworkProbe::new(String::new());
        assert_eq!(probe.sample(), -1.0);
        assert!(!probe.is_configured());
    }

    #[test]
    fn brightness_of_solid_white_image_is_one() {
        let image = GrayImage::from_pixel(4, 4, image::Luma([255]));
        assert!((brightness(&image) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blur_variance_of_solid_image_is_zero() {
        let image = GrayImage::from_pixel(8, 8, image::Luma([128]));
        assert_eq!(blur_variance(&image), 0.0);
    }
}
