//! Scaling policy configuration.
//!
//! A [`PolicyConfig`] is assembled once at startup from compiled-in
//! defaults, an optional TOML file, and environment variables (highest
//! precedence), then normalized and shared read-only for the lifetime of
//! the process.
//!
//! # Environment
//!
//! | Variable | Type | Accepted when |
//! |---|---|---|
//! | `SCALE_FACTOR` | float | `> 1` |
//! | `REPLICA_UPSCALE_TRIGGER` | float | `> 0.1` |
//! | `REPLICA_DOWNSCALE_TRIGGER` | float | `< upper / scale_factor` |
//! | `MIN_REPLICAS_COUNT` | int | `>= 0` |
//! | `MAX_REPLICAS_COUNT` | int | `>= 0` (0 = unbounded) |
//! | `FIXED_REPLICAS` | `true` / other | always |
//! | `CAPACITY_PER_REPLICA` | float or `derived` | `> 0` |
//! | `CAPACITY_HEADROOM` | bool | always |
//! | `CAPACITY_COUNTER` | string | non-empty |
//! | `FIXED_REPLICAS_ANNOTATION` | string | non-empty |
//!
//! A value that cannot be parsed is a hard error. A value that parses
//! but falls outside its accepted range is ignored with a warning.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};

pub const ENV_SCALE_FACTOR: &str = "SCALE_FACTOR";
pub const ENV_UPSCALE_TRIGGER: &str = "REPLICA_UPSCALE_TRIGGER";
pub const ENV_DOWNSCALE_TRIGGER: &str = "REPLICA_DOWNSCALE_TRIGGER";
pub const ENV_MIN_REPLICAS: &str = "MIN_REPLICAS_COUNT";
pub const ENV_MAX_REPLICAS: &str = "MAX_REPLICAS_COUNT";
pub const ENV_FIXED_REPLICAS: &str = "FIXED_REPLICAS";
pub const ENV_CAPACITY_PER_REPLICA: &str = "CAPACITY_PER_REPLICA";
pub const ENV_CAPACITY_HEADROOM: &str = "CAPACITY_HEADROOM";
pub const ENV_CAPACITY_COUNTER: &str = "CAPACITY_COUNTER";
pub const ENV_FIXED_REPLICAS_ANNOTATION: &str = "FIXED_REPLICAS_ANNOTATION";

/// How many counter units a single replica is assumed to host.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "SizingRepr")]
pub enum CapacitySizing {
    /// A constant number of units per replica.
    Fixed(f64),
    /// `capacity / current_replicas`, measured on every request.
    Derived,
}

impl CapacitySizing {
    /// Units per replica for a fleet of `current_replicas` reporting
    /// `capacity` total units. `current_replicas` must be non-zero.
    pub fn per_replica(&self, capacity: i64, current_replicas: u32) -> f64 {
        match self {
            CapacitySizing::Fixed(n) => *n,
            CapacitySizing::Derived => capacity as f64 / current_replicas as f64,
        }
    }
}

impl fmt::Display for CapacitySizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacitySizing::Fixed(n) => write!(f, "{n}"),
            CapacitySizing::Derived => f.write_str("derived"),
        }
    }
}

impl FromStr for CapacitySizing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("derived") {
            return Ok(CapacitySizing::Derived);
        }
        let n: f64 = s
            .parse()
            .map_err(|e: std::num::ParseFloatError| format!("expected a number or \"derived\": {e}"))?;
        if !n.is_finite() {
            return Err("must be finite".to_string());
        }
        Ok(CapacitySizing::Fixed(n))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizingRepr {
    PerReplica(f64),
    Mode(String),
}

impl TryFrom<SizingRepr> for CapacitySizing {
    type Error = String;

    fn try_from(repr: SizingRepr) -> Result<Self, Self::Error> {
        match repr {
            SizingRepr::PerReplica(n) if !n.is_finite() => Err("must be finite".to_string()),
            SizingRepr::PerReplica(n) => Ok(CapacitySizing::Fixed(n)),
            SizingRepr::Mode(s) => s.parse(),
        }
    }
}

/// Immutable scaling policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    /// Multiplicative step for scaling up and down.
    pub scale_factor: f64,
    /// Allocated fraction above which the fleet scales up.
    pub upper_threshold: f64,
    /// Allocated fraction below which the fleet scales down.
    pub lower_threshold: f64,
    pub min_replicas: u32,
    /// Upper clamp; 0 means unbounded.
    pub max_replicas: u32,
    /// Honour the per-request fixed replicas annotation.
    pub fixed_override_enabled: bool,
    pub capacity_per_replica: CapacitySizing,
    /// Multiply capacity-derived replica counts by `scale_factor`.
    pub capacity_headroom: bool,
    /// Name of the fleet counter consumed in capacity mode.
    pub capacity_counter: String,
    /// Annotation key carrying the fixed replica count.
    pub fixed_replicas_annotation: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            scale_factor: 2.0,
            upper_threshold: 0.7,
            lower_threshold: 0.3,
            min_replicas: 2,
            max_replicas: 0,
            fixed_override_enabled: false,
            capacity_per_replica: CapacitySizing::Fixed(5.0),
            capacity_headroom: true,
            capacity_counter: "rooms".to_string(),
            fixed_replicas_annotation: "fixedReplicas".to_string(),
        }
    }
}

/// Optional on-disk overrides. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    scale_factor: Option<f64>,
    upper_threshold: Option<f64>,
    lower_threshold: Option<f64>,
    min_replicas: Option<i64>,
    max_replicas: Option<i64>,
    fixed_override_enabled: Option<bool>,
    capacity_per_replica: Option<CapacitySizing>,
    capacity_headroom: Option<bool>,
    capacity_counter: Option<String>,
    fixed_replicas_annotation: Option<String>,
}

impl PolicyFile {
    /// Reject `inf` and `nan`, which TOML accepts as float literals.
    fn check_finite(&self) -> Result<(), String> {
        let floats = [
            ("scale_factor", self.scale_factor),
            ("upper_threshold", self.upper_threshold),
            ("lower_threshold", self.lower_threshold),
        ];
        for (key, value) in floats {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(format!("{key} must be finite, got {v}"));
            }
        }
        Ok(())
    }
}

impl PolicyConfig {
    /// Build the process policy: defaults, then `path` if given, then the
    /// process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config.apply_file(read_policy_file(path)?);
        }
        config.apply_lookup(|var| std::env::var(var).ok())?;
        config.normalize();
        Ok(config)
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup)?;
        config.normalize();
        Ok(config)
    }

    /// Defaults overridden by a TOML document.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        let file = parse_policy_file(s, Path::new("<inline>"))?;
        let mut config = Self::default();
        config.apply_file(file);
        config.normalize();
        Ok(config)
    }

    /// `max_replicas` as an optional bound.
    pub fn max_bound(&self) -> Option<u32> {
        (self.max_replicas > 0).then_some(self.max_replicas)
    }

    /// Enforce the cross-field invariants.
    ///
    /// After this returns, `lower_threshold < upper_threshold / scale_factor`
    /// and `min_replicas <= max_replicas` whenever `max_replicas` is set.
    pub fn normalize(&mut self) {
        if self.lower_threshold >= self.upper_threshold / self.scale_factor {
            let adjusted = self.upper_threshold / (self.scale_factor + 1.0);
            info!(
                lower = self.lower_threshold,
                upper = self.upper_threshold,
                scale_factor = self.scale_factor,
                adjusted,
                "downscale trigger would undo an upscale; lowering it"
            );
            self.lower_threshold = adjusted;
        }

        if let Some(max) = self.max_bound()
            && self.min_replicas > max
        {
            info!(
                min = self.min_replicas,
                max, "MIN_REPLICAS_COUNT exceeds MAX_REPLICAS_COUNT; adjusting min to max"
            );
            self.min_replicas = max;
        }
    }

    fn apply_lookup<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<f64>(&lookup, ENV_SCALE_FACTOR)? {
            self.set_scale_factor(v, ENV_SCALE_FACTOR);
        }
        if let Some(v) = parse_var::<f64>(&lookup, ENV_UPSCALE_TRIGGER)? {
            self.set_upper_threshold(v, ENV_UPSCALE_TRIGGER);
        }
        if let Some(v) = parse_var::<f64>(&lookup, ENV_DOWNSCALE_TRIGGER)? {
            self.set_lower_threshold(v, ENV_DOWNSCALE_TRIGGER);
        }
        if let Some(v) = parse_var::<i32>(&lookup, ENV_MIN_REPLICAS)?
            && let Some(n) = non_negative(v.into(), ENV_MIN_REPLICAS)
        {
            self.min_replicas = n;
        }
        if let Some(v) = parse_var::<i32>(&lookup, ENV_MAX_REPLICAS)?
            && let Some(n) = non_negative(v.into(), ENV_MAX_REPLICAS)
        {
            self.max_replicas = n;
        }
        if let Some(raw) = read_var(&lookup, ENV_FIXED_REPLICAS) {
            self.fixed_override_enabled = raw == "true";
            if self.fixed_override_enabled {
                info!("FIXED_REPLICAS override is enabled");
            } else {
                info!("FIXED_REPLICAS override is disabled");
            }
        }
        if let Some(v) = parse_var::<CapacitySizing>(&lookup, ENV_CAPACITY_PER_REPLICA)? {
            self.set_capacity_per_replica(v, ENV_CAPACITY_PER_REPLICA);
        }
        if let Some(v) = parse_var::<bool>(&lookup, ENV_CAPACITY_HEADROOM)? {
            self.capacity_headroom = v;
        }
        if let Some(v) = read_var(&lookup, ENV_CAPACITY_COUNTER) {
            self.capacity_counter = v;
        }
        if let Some(v) = read_var(&lookup, ENV_FIXED_REPLICAS_ANNOTATION) {
            self.fixed_replicas_annotation = v;
        }
        Ok(())
    }

    fn apply_file(&mut self, file: PolicyFile) {
        if let Some(v) = file.scale_factor {
            self.set_scale_factor(v, "scale_factor");
        }
        if let Some(v) = file.upper_threshold {
            self.set_upper_threshold(v, "upper_threshold");
        }
        if let Some(v) = file.lower_threshold {
            self.set_lower_threshold(v, "lower_threshold");
        }
        if let Some(n) = file.min_replicas.and_then(|v| non_negative(v, "min_replicas")) {
            self.min_replicas = n;
        }
        if let Some(n) = file.max_replicas.and_then(|v| non_negative(v, "max_replicas")) {
            self.max_replicas = n;
        }
        if let Some(v) = file.fixed_override_enabled {
            self.fixed_override_enabled = v;
        }
        if let Some(v) = file.capacity_per_replica {
            self.set_capacity_per_replica(v, "capacity_per_replica");
        }
        if let Some(v) = file.capacity_headroom {
            self.capacity_headroom = v;
        }
        if let Some(v) = file.capacity_counter.filter(|s| !s.is_empty()) {
            self.capacity_counter = v;
        }
        if let Some(v) = file.fixed_replicas_annotation.filter(|s| !s.is_empty()) {
            self.fixed_replicas_annotation = v;
        }
    }

    fn set_scale_factor(&mut self, v: f64, source: &str) {
        if v > 1.0 {
            self.scale_factor = v;
        } else {
            warn!(source, value = v, "scale factor must be greater than 1; keeping {}", self.scale_factor);
        }
    }

    fn set_upper_threshold(&mut self, v: f64, source: &str) {
        if v > 0.1 {
            self.upper_threshold = v;
        } else {
            warn!(source, value = v, "upscale trigger must be greater than 0.1; keeping {}", self.upper_threshold);
        }
    }

    fn set_lower_threshold(&mut self, v: f64, source: &str) {
        let ceiling = self.upper_threshold / self.scale_factor;
        if v < ceiling {
            self.lower_threshold = v;
        } else {
            warn!(source, value = v, ceiling, "downscale trigger too high; keeping {}", self.lower_threshold);
        }
    }

    fn set_capacity_per_replica(&mut self, v: CapacitySizing, source: &str) {
        match v {
            CapacitySizing::Fixed(n) if n <= 0.0 => {
                warn!(source, value = n, "capacity per replica must be positive; keeping {}", self.capacity_per_replica);
            }
            v => self.capacity_per_replica = v,
        }
    }
}

fn read_policy_file(path: &Path) -> ConfigResult<PolicyFile> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_policy_file(&content, path)
}

fn parse_policy_file(content: &str, path: &Path) -> ConfigResult<PolicyFile> {
    let file_error = |reason: String| ConfigError::File {
        path: path.to_path_buf(),
        reason,
    };
    let file: PolicyFile = toml::from_str(content).map_err(|e| file_error(e.to_string()))?;
    file.check_finite().map_err(file_error)?;
    Ok(file)
}

/// Non-empty value of `var`, if set.
fn read_var<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var).filter(|v| !v.is_empty())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> ConfigResult<Option<T>>
where
    T: FromStr + ParseCheck,
    T::Err: fmt::Display,
{
    let Some(raw) = read_var(lookup, var) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<T>().map_err(|e| ConfigError::Parse {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    parsed.check().map_err(|reason| ConfigError::Parse {
        var,
        value: raw.clone(),
        reason: reason.to_string(),
    })?;
    Ok(Some(parsed))
}

/// Post-parse sanity check for values `str::parse` accepts too eagerly.
trait ParseCheck {
    fn check(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

impl ParseCheck for f64 {
    fn check(&self) -> Result<(), &'static str> {
        if self.is_finite() { Ok(()) } else { Err("must be finite") }
    }
}

impl ParseCheck for i32 {}
impl ParseCheck for bool {}
impl ParseCheck for CapacitySizing {}

fn non_negative(v: i64, source: &str) -> Option<u32> {
    match u32::try_from(v) {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(source, value = v, "replica bound must be between 0 and u32::MAX; ignoring");
            None
        }
    }
}
