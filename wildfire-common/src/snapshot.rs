use serde::{Deserialize, Serialize};

/// Summary of one observed frame of the assembled global grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Time step counter of the model when the frame was gathered.
    pub time_step: u64,
    /// Cells with non-zero intensity.
    pub burning_cells: u64,
    /// Cells that have burnt and gone out (fuel consumed, intensity back to 0).
    pub extinguished_cells: u64,
    /// Mean fuel over the whole grid (0-255).
    pub mean_fuel: f32,
    /// Highest intensity in the frame.
    pub peak_intensity: u8,
    /// Optional: full fuel map, row-major N*N.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fuel_map: Option<Vec<u8>>,
    /// Optional: full fire map, row-major N*N.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fire_map: Option<Vec<u8>>,
}

impl Snapshot {
    /// Computes the frame summary from the two assembled global maps.
    pub fn from_maps(time_step: u64, fuel: &[u8], fire: &[u8], keep_maps: bool) -> Self {
        let mut burning_cells = 0u64;
        let mut extinguished_cells = 0u64;
        let mut peak_intensity = 0u8;
        for (&v, &f) in fuel.iter().zip(fire) {
            if f > 0 {
                burning_cells += 1;
                peak_intensity = peak_intensity.max(f);
            } else if v < u8::MAX {
                extinguished_cells += 1;
            }
        }
        let mean_fuel = if fuel.is_empty() {
            0.0
        } else {
            fuel.iter().map(|&v| v as u64).sum::<u64>() as f32 / fuel.len() as f32
        };

        Snapshot {
            time_step,
            burning_cells,
            extinguished_cells,
            mean_fuel,
            peak_intensity,
            fuel_map: keep_maps.then(|| fuel.to_vec()),
            fire_map: keep_maps.then(|| fire.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_burning_and_extinguished() {
        let fuel = [255, 254, 200, 255];
        let fire = [0, 255, 0, 0];
        let snap = Snapshot::from_maps(3, &fuel, &fire, false);
        assert_eq!(snap.time_step, 3);
        assert_eq!(snap.burning_cells, 1);
        assert_eq!(snap.extinguished_cells, 1);
        assert_eq!(snap.peak_intensity, 255);
        assert_eq!(snap.mean_fuel, 241.0);
        assert!(snap.fuel_map.is_none());
    }

    #[test]
    fn counters_hold_more_than_u32_cells() {
        let mut snap = Snapshot::from_maps(0, &[254; 2], &[0; 2], false);
        snap.extinguished_cells += u64::from(u32::MAX);
        assert_eq!(snap.extinguished_cells, u32::MAX as u64 + 2);
        let burning: u64 = snap.burning_cells;
        assert_eq!(burning, 0);
    }

    #[test]
    fn keeps_maps_on_request() {
        let snap = Snapshot::from_maps(0, &[255; 4], &[0; 4], true);
        assert_eq!(snap.fuel_map.as_deref(), Some(&[255u8; 4][..]));
        assert_eq!(snap.fire_map.as_deref(), Some(&[0u8; 4][..]));
    }
}
