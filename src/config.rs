use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Upper bound accepted for reel velocities, in revs/second.
pub const MAX_REEL_VELOCITY: f32 = 5.0;

const DEFAULT_DEPLOY_VELOCITY: f32 = 0.5;
const DEFAULT_RETRACT_VELOCITY: f32 = 0.5;

/// ECU data processing method, persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataProcMethod {
    Raw = 0,
    Filtered = 1,
    Averaged = 2,
}

impl DataProcMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataProcMethod::Raw),
            1 => Some(DataProcMethod::Filtered),
            2 => Some(DataProcMethod::Averaged),
            _ => None,
        }
    }
}

/// The EEPROM-resident configuration block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    pub deploy_velocity: f32,
    pub retract_velocity: f32,
    pub data_proc_method: u8,
    pub real_time_mcb: bool,
}

impl Default for StoredConfig {
    fn default() -> Self {
        Self {
            deploy_velocity: DEFAULT_DEPLOY_VELOCITY,
            retract_velocity: DEFAULT_RETRACT_VELOCITY,
            data_proc_method: DataProcMethod::Raw as u8,
            real_time_mcb: false,
        }
    }
}

/// Persistence seam for the configuration block. `load` returning `None`
/// means first boot; the defaults are then written back.
pub trait EepromStore {
    fn load(&mut self) -> Option<StoredConfig>;
    fn persist(&mut self, config: &StoredConfig) -> bool;
}

/// In-memory store used by the simulator and the tests.
#[derive(Debug, Default)]
pub struct MemoryEeprom {
    contents: Option<StoredConfig>,
    pub persist_count: u32,
}

impl EepromStore for MemoryEeprom {
    fn load(&mut self) -> Option<StoredConfig> {
        self.contents
    }

    fn persist(&mut self, config: &StoredConfig) -> bool {
        self.contents = Some(*config);
        self.persist_count += 1;
        true
    }
}

/// Validated, write-through view over the persisted configuration.
///
/// Every setter validates, then persists the whole block; a rejected value
/// changes nothing. EEPROM writes only happen from the telecommand
/// dispatcher, outside of a motion.
pub struct RatsConfig {
    values: StoredConfig,
    store: Box<dyn EepromStore + Send>,
}

impl core::fmt::Debug for RatsConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RatsConfig")
            .field("values", &self.values)
            .finish()
    }
}

impl RatsConfig {
    pub fn new(mut store: Box<dyn EepromStore + Send>) -> Self {
        let values = match store.load() {
            Some(values) => values,
            None => {
                let defaults = StoredConfig::default();
                info!("EEPROM empty, writing default configuration");
                if !store.persist(&defaults) {
                    warn!("failed to persist default configuration");
                }
                defaults
            }
        };
        Self { values, store }
    }

    pub fn values(&self) -> &StoredConfig {
        &self.values
    }

    pub fn deploy_velocity(&self) -> f32 {
        self.values.deploy_velocity
    }

    pub fn retract_velocity(&self) -> f32 {
        self.values.retract_velocity
    }

    pub fn data_proc_method(&self) -> DataProcMethod {
        // The stored byte is validated on every write path
        DataProcMethod::from_u8(self.values.data_proc_method).unwrap_or(DataProcMethod::Raw)
    }

    pub fn real_time_mcb(&self) -> bool {
        self.values.real_time_mcb
    }

    pub fn set_deploy_velocity(&mut self, velocity: f32) -> Result<(), &'static str> {
        validate_velocity(velocity)?;
        self.values.deploy_velocity = velocity;
        self.write_through()
    }

    pub fn set_retract_velocity(&mut self, velocity: f32) -> Result<(), &'static str> {
        validate_velocity(velocity)?;
        self.values.retract_velocity = velocity;
        self.write_through()
    }

    pub fn set_data_proc_method(&mut self, method: u8) -> Result<(), &'static str> {
        if DataProcMethod::from_u8(method).is_none() {
            return Err("unknown data processing method");
        }
        self.values.data_proc_method = method;
        self.write_through()
    }

    pub fn set_real_time_mcb(&mut self, enabled: bool) -> Result<(), &'static str> {
        self.values.real_time_mcb = enabled;
        self.write_through()
    }

    fn write_through(&mut self) -> Result<(), &'static str> {
        if self.store.persist(&self.values) {
            Ok(())
        } else {
            Err("EEPROM write failed")
        }
    }
}

fn validate_velocity(velocity: f32) -> Result<(), &'static str> {
    if !velocity.is_finite() || velocity <= 0.0 {
        return Err("velocity must be positive");
    }
    if velocity > MAX_REEL_VELOCITY {
        return Err("velocity exceeds reel limit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_boot_writes_defaults() {
        let mut config = RatsConfig::new(Box::new(MemoryEeprom::default()));
        assert_eq!(config.deploy_velocity(), DEFAULT_DEPLOY_VELOCITY);
        assert_eq!(config.data_proc_method(), DataProcMethod::Raw);
        assert!(!config.real_time_mcb());

        // The defaults were persisted, not just defaulted in memory
        assert!(config.store.load().is_some());
    }

    #[test]
    fn test_write_through_persists() {
        let mut config = RatsConfig::new(Box::new(MemoryEeprom::default()));
        config.set_deploy_velocity(1.25).unwrap();
        config.set_real_time_mcb(true).unwrap();

        let stored = config.store.load().unwrap();
        assert_eq!(stored.deploy_velocity, 1.25);
        assert!(stored.real_time_mcb);
    }

    #[test]
    fn test_validator_rejects_and_keeps_value() {
        let mut config = RatsConfig::new(Box::new(MemoryEeprom::default()));
        assert!(config.set_deploy_velocity(0.0).is_err());
        assert!(config.set_deploy_velocity(-1.0).is_err());
        assert!(config.set_deploy_velocity(MAX_REEL_VELOCITY + 0.1).is_err());
        assert_eq!(config.deploy_velocity(), DEFAULT_DEPLOY_VELOCITY);

        assert!(config.set_data_proc_method(7).is_err());
        assert_eq!(config.data_proc_method(), DataProcMethod::Raw);
    }

    #[test]
    fn test_reload_round_trip() {
        let mut eeprom = MemoryEeprom::default();
        eeprom.persist(&StoredConfig {
            deploy_velocity: 2.0,
            retract_velocity: 1.5,
            data_proc_method: DataProcMethod::Averaged as u8,
            real_time_mcb: true,
        });

        let config = RatsConfig::new(Box::new(eeprom));
        assert_eq!(config.retract_velocity(), 1.5);
        assert_eq!(config.data_proc_method(), DataProcMethod::Averaged);
        assert!(config.real_time_mcb());
    }
}
