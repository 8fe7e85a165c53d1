//! HyperLogLog distinct-value estimation for a single column.
//!
//! Reference: Flajolet, Fusy, Gandouet, Meunier, "HyperLogLog: the
//! analysis of a near-optimal cardinality estimation algorithm", 2007.
//! Small estimates fall back to linear counting.

use serde::{Deserialize, Serialize};

use hillview_dataset::api::Sketch;
use hillview_table::table::Table;
use hillview_types::error::{HillviewError, Result};

pub const MIN_LOG_REGISTERS: u32 = 4;
pub const MAX_LOG_REGISTERS: u32 = 16;

fn check_log_registers(log_reg_num: u32) -> Result<()> {
    if !(MIN_LOG_REGISTERS..=MAX_LOG_REGISTERS).contains(&log_reg_num) {
        return Err(HillviewError::Config(format!(
            "HyperLogLog register count 2^{} outside 2^{}..2^{}",
            log_reg_num, MIN_LOG_REGISTERS, MAX_LOG_REGISTERS
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HLogLogSketch {
    column: String,
    log_reg_num: u32,
    seed: u64,
}

impl HLogLogSketch {
    pub fn new(column: impl Into<String>, log_reg_num: u32, seed: u64) -> Result<Self> {
        check_log_registers(log_reg_num)?;
        Ok(HLogLogSketch {
            column: column.into(),
            log_reg_num,
            seed,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HLogLog {
    log_reg_num: u32,
    seed: u64,
    registers: Vec<u8>,
}

impl HLogLog {
    pub fn new(log_reg_num: u32, seed: u64) -> Result<Self> {
        check_log_registers(log_reg_num)?;
        Ok(HLogLog {
            log_reg_num,
            seed,
            registers: vec![0; 1 << log_reg_num],
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }

    /// Record an already-hashed item. The top `log_reg_num` bits pick the
    /// register.
    pub fn add_hash(&mut self, hash: u64) {
        let index = (hash >> (64 - self.log_reg_num)) as usize;
        let rank = (hash.trailing_zeros() + 1) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    pub fn union(&self, other: &HLogLog) -> Result<HLogLog> {
        if self.log_reg_num != other.log_reg_num || self.seed != other.seed {
            return Err(HillviewError::Config(format!(
                "Cannot union HyperLogLog(2^{}, seed {}) with HyperLogLog(2^{}, seed {})",
                self.log_reg_num, self.seed, other.log_reg_num, other.seed
            )));
        }
        Ok(HLogLog {
            log_reg_num: self.log_reg_num,
            seed: self.seed,
            registers: self
                .registers
                .iter()
                .zip(&other.registers)
                .map(|(a, b)| *a.max(b))
                .collect(),
        })
    }

    fn alpha(&self) -> f64 {
        match self.log_reg_num {
            4 => 0.673,
            5 => 0.697,
            6 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / self.registers.len() as f64),
        }
    }

    pub fn distinct_count(&self) -> u64 {
        let m = self.registers.len() as f64;
        let mut sum = 0.0;
        let mut zeros = 0usize;
        for r in &self.registers {
            sum += 2f64.powi(-(*r as i32));
            if *r == 0 {
                zeros += 1;
            }
        }
        let raw = self.alpha() * m * m / sum;
        // Hashes are 64 bits wide, so no large-range correction applies.
        if zeros > 0 && raw < 2.5 * m {
            (m * (m / zeros as f64).ln()).round() as u64
        } else {
            raw.round() as u64
        }
    }
}

impl Sketch<Table> for HLogLogSketch {
    type Output = HLogLog;

    fn zero(&self) -> HLogLog {
        HLogLog {
            log_reg_num: self.log_reg_num,
            seed: self.seed,
            registers: vec![0; 1 << self.log_reg_num],
        }
    }

    fn create(&self, data: &Table) -> Result<HLogLog> {
        let column = data.column(&self.column)?;
        let mut result = self.zero();
        for row in data.row_iter() {
            if !column.is_missing(row) {
                result.add_hash(column.value(row).hash64(self.seed));
            }
        }
        Ok(result)
    }

    fn add(&self, left: &HLogLog, right: &HLogLog) -> Result<HLogLog> {
        left.union(right)
    }
}
