//! Encode the full configure + start sequence a host runs against a freshly
//! opened device, and check the wire words against the scheduler ABI.

use ert_proto::{
    CmdState, ConfigureCommand, Opcode, PacketHeader, RegisterMap, StartHeader,
    StartKernelCommand,
};

#[test]
fn configure_then_start_wire_sequence() {
    // One CU at 0x1000, 1 KiB slots, 64 KiB CU address granularity.
    let cfg = ConfigureCommand::new(1024, 16, vec![0x1000]);
    let cfg_words = cfg.build().unwrap();

    let header = PacketHeader::decode(cfg_words[0]);
    assert_eq!(header.cmd_opcode(), Some(Opcode::Configure));
    assert_eq!(header.cmd_state(), Some(CmdState::New));
    assert_eq!(header.count, 6);
    assert_eq!(cfg_words.len() * 4, 4 * (1 + 5 + 1));

    // Control word, then a 64-bit buffer address split across 0x40/0x44.
    let mut regmap = RegisterMap::new();
    regmap.set(0x0, 0x0).unwrap();
    regmap.set(0x40, 0xaaaa_0000).unwrap();
    regmap.set(0x44, 0x0000_bbbb).unwrap();
    let start = StartKernelCommand::new(0x1, regmap);
    let start_words = start.build().unwrap();

    let header = StartHeader::decode(start_words[0]);
    assert_eq!(header.opcode, Opcode::StartCu as u32);
    assert_eq!(header.state, CmdState::New as u32);
    // Register map spans offsets 0..=0x44 → 18 dense words, plus the CU mask.
    assert_eq!(header.count, 1 + 18);
    assert_eq!(start_words[1], 0x1);
    assert_eq!(start_words[2], 0x0);
    assert_eq!(start_words[2 + 0x40 / 4], 0xaaaa_0000);
    assert_eq!(start_words[2 + 0x44 / 4], 0x0000_bbbb);
}

#[test]
fn sixty_four_bit_argument_split_is_callers_choice() {
    // set_arg64 and two explicit set calls produce identical wire words.
    let mut explicit = RegisterMap::new();
    explicit.set(0x18, 0xdddd_0000).unwrap();
    explicit.set(0x1c, 0x0000_cccc).unwrap();

    let mut convenience = RegisterMap::new();
    convenience.set_arg64(0x18, 0x0000_cccc_dddd_0000).unwrap();

    assert_eq!(explicit.to_words(), convenience.to_words());
}
