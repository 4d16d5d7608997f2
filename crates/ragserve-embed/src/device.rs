use candle_core::Device;

/// Pick the compute device. CPU is the default; Metal is opt-in behind the
/// `metal` feature and falls back to CPU when unavailable.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            tracing::info!("device: metal");
            return dev;
        }
    }
    tracing::debug!("device: cpu");
    Device::Cpu
}
