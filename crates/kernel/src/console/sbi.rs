//! SBI Debug Console Extension (`DBCN`).

use core::fmt;

const EXTENSION_ID: usize = 0x4442_434E;
const FUNCTION_WRITE: usize = 0x0;

/// Negative error code returned by the SBI implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbiError(isize);

impl fmt::Display for SbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            -1 => write!(f, "failed"),
            -2 => write!(f, "not supported"),
            -3 => write!(f, "invalid parameter(s)"),
            -4 => write!(f, "denied or not allowed"),
            -5 => write!(f, "invalid address(s)"),
            code => write!(f, "unknown error ({code})"),
        }
    }
}

impl core::error::Error for SbiError {}

/// Writes bytes to the debug console and returns how many were written.
pub fn write(bytes: &[u8]) -> Result<usize, SbiError> {
    let (error, value) = unsafe {
        ecall3(
            bytes.len(),
            bytes.as_ptr().addr(),
            0,
            EXTENSION_ID,
            FUNCTION_WRITE,
        )
    };
    if error == 0 {
        Ok(value.cast_unsigned())
    } else {
        Err(SbiError(error))
    }
}

#[inline]
#[cfg_attr(not(target_arch = "riscv64"), expect(unused_variables))]
unsafe fn ecall3(
    arg0: usize,
    arg1: usize,
    arg2: usize,
    extension_id: usize,
    function_id: usize,
) -> (isize, isize) {
    match () {
        #[cfg(target_arch = "riscv64")]
        () => {
            let error;
            let value;
            unsafe {
                core::arch::asm!(
                    "ecall",
                    inlateout("a0") arg0 => error,
                    inlateout("a1") arg1 => value,
                    in("a2") arg2,
                    in("a6") function_id,
                    in("a7") extension_id,
                );
            }
            (error, value)
        }
        #[cfg(not(target_arch = "riscv64"))]
        () => unimplemented!("SBI is only available on riscv64"),
    }
}
