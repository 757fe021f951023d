//! Biome erosion configuration.
//!
//! Each biome carries a bootstrap setting plus one erosion schedule per mesh
//! detail level. Settings are pure data: the engine never mutates them, and
//! the whole catalog is passed into the pipeline explicitly rather than
//! living in a global.
//!
//! Talus tables encode the maximum stable slope (rise/run) as a function of
//! elevation, with a per-bucket jitter band that positional noise picks
//! within. Slopes are stored as `angle / 90°` fractions clamped to `[0,1]`.

/// Height buckets in a talus table.
pub const TALUS_BUCKETS: usize = 1024;

/// Jitter buckets across the noise range `[-1, 1]`.
pub const JITTER_BUCKETS: usize = 256;

/// Quantized maximum-slope lookup: 1024 height buckets, each with a base
/// slope and a jitter half-width. The two arrays form a virtual 1024x256
/// grid indexed by `(height bucket, jitter bucket)`.
#[derive(Clone)]
pub struct TalusAngles {
    base: Vec<f32>,
    jitter: Vec<f32>,
}

impl TalusAngles {
    /// Linear ramp from `min_angle_deg` rising by `delta_angle_deg` across
    /// the height range, with a constant jitter band of `jitter_deg`.
    pub fn ramp(min_angle_deg: f32, delta_angle_deg: f32, jitter_deg: f32) -> Self {
        let increment = delta_angle_deg / (TALUS_BUCKETS - 1) as f32;
        let base: Vec<f32> = (0..TALUS_BUCKETS)
            .map(|i| ((min_angle_deg + i as f32 * increment) / 90.0).clamp(0.0, 1.0))
            .collect();
        let jitter = base
            .iter()
            .map(|&b| (jitter_deg / 90.0).min(b.min(1.0 - b)).clamp(0.0, 1.0))
            .collect();
        Self { base, jitter }
    }

    /// Gaussian bump over the height buckets: steepest slopes around `mean`,
    /// flattening towards both ends. `jitter_fraction` scales the jitter
    /// band proportionally to the base slope.
    pub fn normal(scale: f32, std_dev: f32, mean: f32, jitter_fraction: f32) -> Self {
        let term0 = -2.0 * std_dev as f64 * std_dev as f64;
        let term1 = scale as f64 * (1.0 / (std::f64::consts::PI * -term0).sqrt());
        let mut base = Vec::with_capacity(TALUS_BUCKETS);
        let mut jitter = Vec::with_capacity(TALUS_BUCKETS);
        for i in 0..TALUS_BUCKETS {
            let d = i as f64 - mean as f64;
            let angle = ((term1 * (d * d / term0).exp()) / 90.0) as f32;
            let b = angle.clamp(0.0, 1.0);
            base.push(b);
            jitter.push((b * jitter_fraction).min(b.min(1.0 - b)).clamp(0.0, 1.0));
        }
        Self { base, jitter }
    }

    /// Stepped cliff-and-bench profile: alternating shallow benches and
    /// near-vertical risers, no jitter.
    pub fn plateau() -> Self {
        const PROFILE: [(usize, f32); 5] = [
            (240, 30.0),
            (520, 89.0),
            (760, 45.0),
            (990, 89.0),
            (2000, 0.05),
        ];
        let base: Vec<f32> = (0..TALUS_BUCKETS)
            .map(|i| {
                let mut angle = PROFILE[PROFILE.len() - 1].1;
                for &(limit, layer_angle) in &PROFILE {
                    if i < limit {
                        angle = layer_angle;
                        break;
                    }
                }
                (angle / 90.0).clamp(0.0, 1.0)
            })
            .collect();
        Self {
            base,
            jitter: vec![0.0; TALUS_BUCKETS],
        }
    }

    /// Maximum slope for a height bucket, displaced inside the jitter band
    /// by the jitter bucket: bucket 128 is the base value, 0 and 255 are the
    /// band edges.
    pub fn sample(&self, height_bucket: usize, jitter_bucket: usize) -> f32 {
        let hb = height_bucket.min(TALUS_BUCKETS - 1);
        let jb = jitter_bucket.min(JITTER_BUCKETS - 1);
        self.base[hb] + self.jitter[hb] * ((jb as f32 - 128.0) / 128.0)
    }
}

/// One erosion step configuration.
#[derive(Clone)]
pub struct ErosionSettings {
    /// How many consecutive iterations this setting runs for inside its
    /// level's schedule.
    pub iterations: usize,
    /// Implicit solver time step.
    pub delta_time: f32,
    /// Slope clamp table.
    pub talus_angles: TalusAngles,
    /// Scales height into talus-table buckets.
    pub height_multiplier: f32,
    /// Stream-power coefficient applied to `sqrt(drainage area)`.
    pub erosion_power: f32,
}

/// Per-detail-level erosion schedule for one biome.
#[derive(Clone)]
pub struct ErosionLevel {
    /// Scales the uplift sampled from the mask at this level.
    pub uplift_multiplier: f32,
    /// Scales the height seeded from the previous level's raster.
    pub previous_tier_blend_weight: f32,
    /// Settings run in order; each entry repeats for its `iterations` count.
    pub settings: Vec<ErosionSettings>,
}

impl ErosionLevel {
    /// Expand the schedule to exactly `iterations` entries: each setting
    /// repeats for its own count, then the schedule is truncated or padded
    /// with its last entry. Empty schedules yield an empty expansion; the
    /// pipeline validates against that before running.
    pub fn schedule(&self, iterations: usize) -> Vec<&ErosionSettings> {
        let mut out = Vec::with_capacity(iterations);
        for settings in &self.settings {
            for _ in 0..settings.iterations {
                out.push(settings);
            }
        }
        out.truncate(iterations);
        if let Some(&last) = out.last() {
            while out.len() < iterations {
                out.push(last);
            }
        }
        out
    }
}

/// Mesh detail level of the multi-resolution pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailLevel {
    Low,
    Mid,
    High,
}

/// A biome's full erosion behavior.
#[derive(Clone)]
pub struct Biome {
    pub name: &'static str,
    /// Uplift floor (physical units per unit time).
    pub min_uplift: f32,
    /// Uplift range above the floor that the byte mask spans.
    pub delta_uplift: f32,
    /// Single-step settings used when seeding the coarsest level.
    pub bootstrap: ErosionSettings,
    pub low: ErosionLevel,
    pub mid: ErosionLevel,
    pub high: ErosionLevel,
}

impl Biome {
    pub fn level(&self, level: DetailLevel) -> &ErosionLevel {
        match level {
            DetailLevel::Low => &self.low,
            DetailLevel::Mid => &self.mid,
            DetailLevel::High => &self.high,
        }
    }
}

/// The biome list the simulation indexes into. Biome-mask byte `n` maps to
/// catalog entry `n - 1` (byte 0 also maps to entry 0).
pub struct BiomeCatalog {
    biomes: Vec<Biome>,
}

impl BiomeCatalog {
    pub fn new(biomes: Vec<Biome>) -> Self {
        Self { biomes }
    }

    /// The standard six-biome catalog: coastal mountains, mountains,
    /// foothills, rolling hills, plains, plateau.
    pub fn standard() -> Self {
        Self::new(vec![
            coastal_mountains(),
            mountains(),
            foothills(),
            rolling_hills(),
            plains(),
            plateau(),
        ])
    }

    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    pub fn get(&self, index: usize) -> &Biome {
        &self.biomes[index]
    }

    /// Clamp a raw biome-mask byte to a valid catalog index.
    pub fn index_from_mask(&self, byte: u8) -> usize {
        (byte.saturating_sub(1) as usize).min(self.biomes.len() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Biome> {
        self.biomes.iter()
    }

    /// Bootstrap settings, one per biome, in catalog order.
    pub fn bootstrap_settings(&self) -> Vec<&ErosionSettings> {
        self.biomes.iter().map(|b| &b.bootstrap).collect()
    }
}

fn settings(
    iterations: usize,
    delta_time: f32,
    talus_angles: TalusAngles,
    height_multiplier: f32,
    erosion_power: f32,
) -> ErosionSettings {
    ErosionSettings {
        iterations,
        delta_time,
        talus_angles,
        height_multiplier,
        erosion_power,
    }
}

fn coastal_mountains() -> Biome {
    let high_variance = || TalusAngles::ramp(15.0, 30.0, 0.5);
    Biome {
        name: "coastal mountains",
        min_uplift: 0.0006,
        delta_uplift: 0.0045,
        bootstrap: settings(1, 85_000.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 1.0),
        low: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![
                settings(1, 3_000_000.0, high_variance(), 1.0, 1.0),
                settings(4, 75_000.0, high_variance(), 1.0, 1.0),
                settings(45, 250_000.0, high_variance(), 1.0, 1.0),
            ],
        },
        mid: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(
                25,
                250_000.0,
                TalusAngles::ramp(15.0, 30.0, 0.3),
                1.0,
                3.0,
            )],
        },
        high: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(
                25,
                10_000.0,
                TalusAngles::ramp(15.0, 30.0, 0.1),
                1.0,
                9.0,
            )],
        },
    }
}

fn mountains() -> Biome {
    let high_variance = || TalusAngles::ramp(30.0, 15.0, 0.5);
    Biome {
        name: "mountains",
        min_uplift: 0.0008,
        delta_uplift: 0.0062,
        bootstrap: settings(1, 85_000.0, TalusAngles::ramp(30.0, 15.0, 0.0), 1.0, 1.0),
        low: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![
                settings(1, 3_000_000.0, high_variance(), 1.0, 1.0),
                settings(4, 75_000.0, high_variance(), 1.0, 1.0),
                settings(45, 250_000.0, high_variance(), 1.0, 1.0),
            ],
        },
        mid: ErosionLevel {
            uplift_multiplier: 0.5,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(
                25,
                250_000.0,
                TalusAngles::ramp(30.0, 15.0, 0.2),
                1.0,
                1.0,
            )],
        },
        high: ErosionLevel {
            uplift_multiplier: 0.2,
            previous_tier_blend_weight: 1.0,
            settings: vec![
                settings(9, 250_000.0, TalusAngles::ramp(30.0, 15.0, 0.1), 1.0, 1.0),
                settings(16, 250_000.0, TalusAngles::ramp(30.0, 15.0, 0.0), 1.0, 1.0),
            ],
        },
    }
}

fn foothills() -> Biome {
    let low_variance = || TalusAngles::ramp(15.0, 30.0, 0.1);
    Biome {
        name: "foothills",
        min_uplift: 0.0004,
        delta_uplift: 0.0024,
        bootstrap: settings(1, 85_000.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 1.0),
        low: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(50, 3_000_000.0, low_variance(), 1.0, 3.5)],
        },
        mid: ErosionLevel {
            uplift_multiplier: 0.5,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, low_variance(), 1.0, 2.0)],
        },
        high: ErosionLevel {
            uplift_multiplier: 0.25,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, low_variance(), 1.0, 2.0)],
        },
    }
}

fn rolling_hills() -> Biome {
    let rounded = || TalusAngles::normal(30_000.0, 270.0, 512.0, 0.05);
    Biome {
        name: "rolling hills",
        min_uplift: 0.0002,
        delta_uplift: 0.0014,
        bootstrap: settings(1, 85_000.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 1.0),
        low: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![
                settings(1, 3_000_000.0, rounded(), 30.0, 8.0),
                settings(4, 75_000.0, rounded(), 30.0, 8.0),
                settings(45, 250_000.0, rounded(), 30.0, 8.0),
            ],
        },
        mid: ErosionLevel {
            uplift_multiplier: 0.4,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, rounded(), 30.0, 4.0)],
        },
        high: ErosionLevel {
            uplift_multiplier: 0.4,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, rounded(), 30.0, 2.5)],
        },
    }
}

fn plains() -> Biome {
    let flat = || TalusAngles::normal(20_000.0, 310.0, 512.0, 0.005);
    Biome {
        name: "plains",
        min_uplift: 0.00005,
        delta_uplift: 0.0006,
        bootstrap: settings(1, 85_000.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 1.0),
        low: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![
                settings(1, 3_000_000.0, flat(), 100.0, 5.0),
                settings(4, 75_000.0, flat(), 100.0, 5.0),
                settings(45, 250_000.0, flat(), 100.0, 7.0),
            ],
        },
        mid: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, flat(), 100.0, 7.0)],
        },
        high: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, flat(), 100.0, 5.0)],
        },
    }
}

fn plateau() -> Biome {
    Biome {
        name: "plateau",
        min_uplift: 0.0005,
        delta_uplift: 0.003,
        bootstrap: settings(1, 85_000.0, TalusAngles::ramp(15.0, 30.0, 0.0), 10.0, 1.0),
        low: ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(50, 250_000.0, TalusAngles::plateau(), 10.0, 1.0)],
        },
        mid: ErosionLevel {
            uplift_multiplier: 0.9,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 250_000.0, TalusAngles::plateau(), 10.0, 0.2)],
        },
        high: ErosionLevel {
            uplift_multiplier: 0.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(25, 50_000.0, TalusAngles::plateau(), 10.0, 1.0)],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_talus_in_range() {
        let talus = TalusAngles::ramp(15.0, 30.0, 0.5);
        for hb in [0, 100, 511, 1023] {
            for jb in [0, 128, 255] {
                let slope = talus.sample(hb, jb);
                assert!(
                    (0.0..=1.0).contains(&slope),
                    "slope {} out of range at ({}, {})",
                    slope,
                    hb,
                    jb
                );
            }
        }
        // The ramp rises with height.
        assert!(talus.sample(1023, 128) > talus.sample(0, 128));
    }

    #[test]
    fn test_talus_center_bucket_is_base() {
        let talus = TalusAngles::ramp(20.0, 10.0, 5.0);
        let base = talus.sample(512, 128);
        let low = talus.sample(512, 0);
        let high = talus.sample(512, 255);
        assert!(low < base && base < high);
        assert!((base - (20.0 + 512.0 * (10.0 / 1023.0)) / 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_normal_talus_peaks_at_mean() {
        let talus = TalusAngles::normal(30_000.0, 270.0, 512.0, 0.05);
        assert!(talus.sample(512, 128) > talus.sample(0, 128));
        assert!(talus.sample(512, 128) > talus.sample(1023, 128));
    }

    #[test]
    fn test_plateau_talus_steps() {
        let talus = TalusAngles::plateau();
        // Bench below the first riser, cliff above it.
        assert!((talus.sample(100, 128) - 30.0 / 90.0).abs() < 1e-6);
        assert!((talus.sample(300, 128) - 89.0 / 90.0).abs() < 1e-6);
        // Above the profile: nearly flat.
        assert!(talus.sample(1000, 128) < 0.01);
    }

    #[test]
    fn test_schedule_expands_and_pads() {
        let level = ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![
                settings(1, 10.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 1.0),
                settings(4, 20.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 2.0),
            ],
        };
        let schedule = level.schedule(8);
        assert_eq!(schedule.len(), 8);
        assert_eq!(schedule[0].delta_time, 10.0);
        assert_eq!(schedule[1].delta_time, 20.0);
        assert_eq!(schedule[4].delta_time, 20.0);
        // Padded with the last entry.
        assert_eq!(schedule[7].delta_time, 20.0);
    }

    #[test]
    fn test_schedule_truncates() {
        let level = ErosionLevel {
            uplift_multiplier: 1.0,
            previous_tier_blend_weight: 1.0,
            settings: vec![settings(50, 10.0, TalusAngles::ramp(15.0, 30.0, 0.0), 1.0, 1.0)],
        };
        assert_eq!(level.schedule(5).len(), 5);
    }

    #[test]
    fn test_standard_catalog() {
        let catalog = BiomeCatalog::standard();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog.index_from_mask(0), 0);
        assert_eq!(catalog.index_from_mask(1), 0);
        assert_eq!(catalog.index_from_mask(6), 5);
        // Out-of-range bytes clamp to the last biome.
        assert_eq!(catalog.index_from_mask(200), 5);
        for biome in catalog.iter() {
            assert!(!biome.low.settings.is_empty(), "{} has no schedule", biome.name);
        }
    }
}
