// Integration tests for the SysV ppc64 calling convention
mod utils;

use ppc64dbg_core::abi::{
    AbiSysVPpc64, ArgumentLocation, ArgumentSlot, BasicType, Classification, ReturnValue, Scalar,
    TypedValue,
};
use ppc64dbg_core::error::DebugCoreError;
use ppc64dbg_core::registers::{
    register_by_name, RegisterId, CR, CTR, F1, LR, PC, R1, R2, R3, R13, R31, V2,
};
use ppc64dbg_core::runtime::{RegisterContext, RegisterValue, TargetMemory};
use ppc64dbg_core::target::{TargetArch, TargetSpec};
use utils::*;

fn ty(name: &str) -> BasicType {
    BasicType::parse(name).unwrap()
}

fn slots(names: &[&str]) -> Vec<ArgumentSlot> {
    names.iter().map(|name| ArgumentSlot::new(&ty(name))).collect()
}

#[test]
fn test_trivial_call_round_trip() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let mut memory = mock_memory_manager();

    abi.prepare_trivial_call(&mut regs, &mut memory, 0x7FFF_FFF0, 0x2000, 0x3000, &[1, 2, 3])?;

    assert_eq!(regs.gpr[1], 0x7FFF_FFD0);
    assert_eq!(regs.pc, 0x2000);
    assert_u64_at(&memory, 0x7FFF_FFE0, 0x3000, "return address slot");
    assert_u64_at(&memory, 0x7FFF_FFD0, 0x7FFF_0000, "back chain");

    let mut values = slots(&["u64", "u64", "u64"]);
    abi.get_argument_values(&regs, &memory, &mut values)?;
    let resolved: Vec<u64> = values.iter().map(|v| v.value.unwrap().as_u64()).collect();
    assert_eq!(resolved, vec![1, 2, 3]);
    assert_eq!(values[0].location, Some(ArgumentLocation::Register(R3)));
    assert_eq!(values[2].location, Some(ArgumentLocation::Register(RegisterId::gpr(5))));
    Ok(())
}

#[test]
fn test_trivial_call_aligns_stack() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let mut memory = mock_memory_manager();

    abi.prepare_trivial_call(&mut regs, &mut memory, 0x7FFF_FFF7, 0x2000, 0x3000, &[])?;
    assert_eq!(regs.gpr[1], 0x7FFF_FFF0 - 32);
    assert_eq!(regs.gpr[1] % 16, 0);
    Ok(())
}

#[test]
fn test_trivial_call_uses_eight_argument_registers() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let mut memory = mock_memory_manager();
    let args: Vec<u64> = (1..=8).map(|i| i * 0x11).collect();

    abi.prepare_trivial_call(&mut regs, &mut memory, 0x7FFF_FFF0, 0x2000, 0x3000, &args)?;
    assert_eq!(&regs.gpr[3..=10], args.as_slice());
    Ok(())
}

#[test]
fn test_trivial_call_rejects_nine_arguments() {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let mut memory = mock_memory_manager();
    let before = regs.clone();

    let err = abi
        .prepare_trivial_call(&mut regs, &mut memory, 0x7FFF_FFF0, 0x2000, 0x3000, &[0; 9])
        .unwrap_err();
    assert_eq!(err, DebugCoreError::TooManyArguments { count: 9, max: 8 });
    assert_context_equal(&before, &regs, "no writes");
}

#[test]
fn test_trivial_call_failure_is_not_rolled_back() {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let mut memory = mock_memory_manager();

    // stack slot is unmapped: arguments are already written when the store fails
    let err = abi
        .prepare_trivial_call(&mut regs, &mut memory, 0x4000_0000, 0x2000, 0x3000, &[7])
        .unwrap_err();
    assert!(matches!(err, DebugCoreError::MemoryAccess { .. }));
    assert_eq!(regs.gpr[3], 7);
    assert_eq!(regs.gpr[1], 0x7FFF_0000);
    assert_eq!(regs.pc, CODE_BASE);
}

#[test]
fn test_stack_arguments_after_six_registers() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let regs = mock_cpu_context_with_registers(&[
        (R3, 1),
        (RegisterId::gpr(4), 2),
        (RegisterId::gpr(5), 3),
        (RegisterId::gpr(6), 4),
        (RegisterId::gpr(7), 5),
        (RegisterId::gpr(8), 6),
        // r9/r10 are never consulted by argument extraction
        (RegisterId::gpr(9), 0x99),
        (RegisterId::gpr(10), 0x1010),
    ]);
    let mut memory = mock_memory_manager();
    memory.write_unsigned(0x7FFF_0030, 0xFFFF_FFFB, 4)?;
    memory.write_unsigned(0x7FFF_0034, 0xBEEF, 2)?;

    let mut values = slots(&["u64", "u64", "u64", "u64", "u64", "u64", "i32", "u16"]);
    abi.get_argument_values(&regs, &memory, &mut values)?;

    assert_eq!(values[5].value, Some(Scalar::Unsigned { value: 6, bits: 64 }));
    assert_eq!(values[6].value, Some(Scalar::Signed { value: -5, bits: 32 }));
    assert_eq!(
        values[6].location,
        Some(ArgumentLocation::Stack {
            address: 0x7FFF_0030,
            size: 4
        })
    );
    assert_eq!(values[7].value, Some(Scalar::Unsigned { value: 0xBEEF, bits: 16 }));
    assert_eq!(
        values[7].location,
        Some(ArgumentLocation::Stack {
            address: 0x7FFF_0034,
            size: 2
        })
    );
    Ok(())
}

#[test]
fn test_non_integer_arguments_are_skipped() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let regs = mock_cpu_context_with_registers(&[(R3, 0xFFFF_FFFF), (RegisterId::gpr(4), 0x4000)]);
    let memory = mock_memory_manager();

    let mut values = slots(&["f64", "i32", "v16", "ptr"]);
    abi.get_argument_values(&regs, &memory, &mut values)?;

    assert!(!values[0].is_resolved());
    assert_eq!(values[1].value.map(|v| v.as_i64()), Some(-1));
    assert!(!values[2].is_resolved());
    assert_eq!(values[3].value, Some(Scalar::Unsigned { value: 0x4000, bits: 64 }));
    assert_eq!(values[3].location, Some(ArgumentLocation::Register(RegisterId::gpr(4))));
    Ok(())
}

#[test]
fn test_wide_integer_argument_fails() {
    let abi = AbiSysVPpc64::new();
    let regs = mock_cpu_context_with_registers(&[(R3, 42)]);
    let memory = mock_memory_manager();

    let mut values = slots(&["u64", "i128", "u64"]);
    let err = abi.get_argument_values(&regs, &memory, &mut values).unwrap_err();
    assert!(matches!(err, DebugCoreError::UnsupportedClassification(_)));
    assert_eq!(values[0].value.map(|v| v.as_u64()), Some(42));
    assert_eq!(values[1].location, None);
    assert_eq!(values[2].location, None);
}

#[test]
fn test_zero_stack_pointer_fails() {
    let abi = AbiSysVPpc64::new();
    let regs = mock_cpu_context_with_registers(&[(R1, 0)]);
    let memory = mock_memory_manager();

    let mut values = slots(&["u64"]);
    assert!(abi.get_argument_values(&regs, &memory, &mut values).is_err());
    assert!(!values[0].is_resolved());
}

#[test]
fn test_integer_return_round_trip() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let i32_ty = ty("i32");

    abi.set_return_value_object(&mut regs, &TypedValue::new(&i32_ty, Scalar::Signed { value: -7, bits: 32 }))?;
    assert_eq!(regs.gpr[3], 0xFFFF_FFF9);

    let value = abi.get_return_value_object_simple(&regs, &i32_ty);
    assert_eq!(value.and_then(|v| v.scalar()).map(|s| s.as_i64()), Some(-7));
    Ok(())
}

#[test]
fn test_integer_return_truncation() {
    let abi = AbiSysVPpc64::new();
    let regs = mock_cpu_context_with_registers(&[(R3, 0x1_8000)]);

    let read = |name: &str| {
        abi.get_return_value_object_simple(&regs, &ty(name))
            .and_then(|v| v.scalar())
    };
    assert_eq!(read("u8"), Some(Scalar::Unsigned { value: 0, bits: 8 }));
    assert_eq!(read("i16"), Some(Scalar::Signed { value: -32768, bits: 16 }));
    assert_eq!(read("u32"), Some(Scalar::Unsigned { value: 0x1_8000, bits: 32 }));
    assert_eq!(read("i64"), Some(Scalar::Signed { value: 0x1_8000, bits: 64 }));
    assert_eq!(read("ptr"), Some(Scalar::Unsigned { value: 0x1_8000, bits: 64 }));
    assert_eq!(read("i24"), None);
    assert_eq!(read("u128"), None);
}

#[test]
fn test_float_return_round_trip() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();

    abi.set_return_value_object(&mut regs, &TypedValue::new(&ty("f64"), Scalar::F64(3.5)))?;
    assert_eq!(regs.fpr[1], 3.5);
    assert_eq!(
        abi.get_return_value_object_simple(&regs, &ty("f64")),
        Some(ReturnValue::Scalar(Scalar::F64(3.5)))
    );

    abi.set_return_value_object(&mut regs, &TypedValue::new(&ty("f32"), Scalar::F32(1.25)))?;
    assert_eq!(
        abi.get_return_value_object_simple(&regs, &ty("f32")),
        Some(ReturnValue::Scalar(Scalar::F32(1.25)))
    );
    assert_eq!(regs.read_register(F1)?, RegisterValue::U64(1.25f64.to_bits()));
    Ok(())
}

#[test]
fn test_single_precision_return_is_narrowed() {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    regs.fpr[1] = 1.5;

    // the low 32 bits of 1.5f64 are zero; narrowing keeps the value
    assert_eq!(
        abi.get_return_value_object_simple(&regs, &ty("f32")),
        Some(ReturnValue::Scalar(Scalar::F32(1.5)))
    );
}

#[test]
fn test_unsigned_register_argument_truncated_to_width() -> anyhow::Result<()> {
    let abi = AbiSysVPpc64::new();
    let regs = mock_cpu_context_with_registers(&[(R3, 0xFFFF_FFFF_0000_0007)]);
    let memory = mock_memory_manager();

    let mut values = slots(&["u32"]);
    abi.get_argument_values(&regs, &memory, &mut values)?;
    assert_eq!(values[0].value, Some(Scalar::Unsigned { value: 7, bits: 32 }));
    Ok(())
}

#[test]
fn test_unsupported_return_values() {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let before = regs.clone();

    let cases = [
        TypedValue::untyped(Scalar::Unsigned { value: 1, bits: 64 }),
        TypedValue::new(&ty("u128"), Scalar::Unsigned { value: 1, bits: 64 }),
        TypedValue::new(
            &Classification::Float {
                bits: 64,
                complex: true,
            },
            Scalar::F64(1.0),
        ),
        TypedValue::new(
            &Classification::Float {
                bits: 128,
                complex: false,
            },
            Scalar::F64(1.0),
        ),
        TypedValue::new(&Classification::Aggregate { byte_size: 16 }, Scalar::F64(1.0)),
        TypedValue::new(&ty("v16"), Scalar::F64(1.0)),
    ];
    for value in &cases {
        let err = abi.set_return_value_object(&mut regs, value).unwrap_err();
        assert!(
            matches!(err, DebugCoreError::UnsupportedClassification(_)),
            "{:?}",
            value
        );
    }
    assert_context_equal(&before, &regs, "rejected return values");
}

#[test]
fn test_vector_return() {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    let bytes: [u8; 16] = std::array::from_fn(|i| i as u8);
    regs.write_register(V2, RegisterValue::Vector(bytes)).unwrap();

    assert_eq!(
        abi.get_return_value_object_simple(&regs, &ty("v16")),
        Some(ReturnValue::Bytes(bytes.to_vec()))
    );
    assert_eq!(
        abi.get_return_value_object_simple(&regs, &ty("v8")),
        Some(ReturnValue::Bytes(bytes[..8].to_vec()))
    );
    assert_eq!(abi.get_return_value_object_simple(&regs, &ty("v32")), None);
    assert_eq!(abi.get_return_value_object_simple(&regs, &ty("v0")), None);
}

#[test]
fn test_unreadable_return_register() {
    let abi = AbiSysVPpc64::new();
    let mut regs = mock_cpu_context();
    regs.mark_unavailable(R3);
    assert_eq!(abi.get_return_value_object_simple(&regs, &ty("u64")), None);
    assert!(abi
        .get_return_value_object_simple(&regs, &ty("f64"))
        .is_some());
}

#[test]
fn test_register_usage_tables() {
    let abi = AbiSysVPpc64::new();
    assert_eq!(abi.red_zone_size(), 224);

    let saved = [R1, R2, R13, R31, PC, RegisterId::fpr(14), RegisterId::fpr(31)];
    for reg in saved {
        assert!(abi.register_is_callee_saved(reg), "{} should be preserved", reg);
        assert!(!abi.register_is_volatile(reg));
    }
    let volatile = [RegisterId::gpr(0), R3, RegisterId::gpr(12), LR, CTR, CR, F1, RegisterId::fpr(13), V2];
    for reg in volatile {
        assert!(abi.register_is_volatile(reg), "{} should be volatile", reg);
    }
    assert_eq!(register_by_name("sp").map(|r| abi.register_is_callee_saved(r)), Some(true));

    let infos = abi.get_register_info_array();
    assert_eq!(infos.len(), 105);
    assert_eq!(infos[R3.0 as usize].name, "r3");
    assert_eq!(infos[V2.0 as usize].byte_size, 16);
}

#[test]
fn test_abi_creation_per_target() {
    assert!(AbiSysVPpc64::create(&TargetSpec::ppc64le_elf()).is_some());
    let mut target = TargetSpec::default();
    target.arch = TargetArch::Ppc64;
    assert!(AbiSysVPpc64::create(&target).is_some());
    target.arch = TargetArch::PowerPc;
    assert!(AbiSysVPpc64::create(&target).is_none());
}
