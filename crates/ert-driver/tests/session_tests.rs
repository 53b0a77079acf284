//! Device-session tests over the software scheduler channel.

use ert_driver::{DeviceInfo, ErtDevice, ErtError, QueueGeometry, SimChannel};
use ert_proto::{
    CmdState, ConfigureCommand, EncodingError, Features, RegisterMap, StartKernelCommand,
};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

fn sim_device() -> ErtDevice {
    let info = DeviceInfo::simulated(QueueGeometry::default());
    ErtDevice::with_channel(info, Box::new(SimChannel::new(8, 4096)))
}

fn hello_regmap(dev_addr: u64) -> RegisterMap {
    let mut regmap = RegisterMap::new();
    regmap.set(0x0, 0).unwrap();
    regmap.set_arg64(0x40, dev_addr).unwrap();
    regmap
}

#[test]
fn configure_then_start_completes() {
    let mut dev = sim_device();

    let cfg = ConfigureCommand::new(1024, 16, vec![0x1800_0000]).with_features(Features {
        ert: true,
        cu_dma: true,
        cu_isr: true,
        ..Features::default()
    });
    let state = dev.configure(&cfg, TIMEOUT).unwrap();
    assert_eq!(state, CmdState::Completed);

    let config = dev.config().expect("CU table recorded");
    assert_eq!(config.num_cus(), 1);
    assert_eq!(config.slot_size, 1024);

    let start = StartKernelCommand::new(0x1, hello_regmap(0x0000_bbbb_aaaa_0000));
    let state = dev.start_kernel(&start, TIMEOUT).unwrap();
    assert_eq!(state, CmdState::Completed);
}

#[test]
fn start_before_configure_is_rejected_host_side() {
    let mut dev = sim_device();
    let start = StartKernelCommand::new(0x1, hello_regmap(0x1000));
    let err = dev.start_kernel(&start, TIMEOUT).unwrap_err();
    assert!(matches!(err, ErtError::InvalidState { .. }));
}

#[test]
fn mask_beyond_configured_cus_is_rejected() {
    let mut dev = sim_device();
    dev.configure(&ConfigureCommand::new(1024, 16, vec![0x1800_0000]), TIMEOUT)
        .unwrap();

    // CU 1 was never configured.
    let start = StartKernelCommand::new(0x2, hello_regmap(0x1000));
    let err = dev.start_kernel(&start, TIMEOUT).unwrap_err();
    assert!(matches!(err, ErtError::InvalidState { .. }));
}

#[test]
fn misaligned_slot_size_is_an_encoding_error() {
    let mut dev = sim_device();
    // The simulator accepts word multiples only; 1022 is not one.
    let cfg = ConfigureCommand::new(1022, 16, vec![0x1800_0000]);
    let err = dev.configure(&cfg, TIMEOUT).unwrap_err();
    assert!(matches!(
        err,
        ErtError::Encoding {
            source: EncodingError::MisalignedSlotSize {
                slot_size: 1022,
                alignment: 4
            }
        }
    ));
}

#[test]
fn reconfigure_replaces_cu_table() {
    let mut dev = sim_device();
    dev.configure(&ConfigureCommand::new(1024, 16, vec![0x1800_0000]), TIMEOUT)
        .unwrap();
    dev.configure(
        &ConfigureCommand::new(2048, 16, vec![0x1800_0000, 0x1801_0000]),
        TIMEOUT,
    )
    .unwrap();

    let config = dev.config().unwrap();
    assert_eq!(config.num_cus(), 2);
    assert_eq!(config.slot_size, 2048);

    // CU 1 is now addressable.
    let start = StartKernelCommand::new(0x2, hello_regmap(0x1000));
    assert_eq!(dev.start_kernel(&start, TIMEOUT).unwrap(), CmdState::Completed);
}
