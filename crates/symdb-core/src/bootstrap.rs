//! # Kernel Bootstrap
//!
//! One-time acquisition of the running kernel's own debug info.
//!
//! The bootstrap holds the subsystem lock for its whole run, so every query
//! that needs the lock waits for it (and queries checking the disabled flag
//! fail fast). It:
//!
//! 1. signals "started" right after taking the lock
//! 2. checks that the system process exists
//! 3. finds the kernel's debug-info identity: caller supplied, else from the
//!    image header, else by scanning the first 8 MiB of the image for a
//!    CodeView record that looks like the kernel's
//! 4. registers the kernel as `ntoskrnl` and loads its package
//! 5. enables the subsystem
//!
//! Any failure leaves the subsystem disabled until it is reconfigured.

use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::context::{Context, KERNEL_MODULE_NAME};
use crate::error::{SymbolError, SymbolResult};
use crate::image::ImageParser;
use crate::memory::{le_u32, MemoryReader};
use crate::store::ModuleRegistration;
use crate::types::debug_info::{RSDS_HEADER_LEN, RSDS_SIGNATURE};
use crate::types::{Address, DebugInfoId, Guid, ProcessId, SymbolHandle};

/// How long initialization waits for an asynchronous bootstrap to start.
pub const STARTED_TIMEOUT: Duration = Duration::from_millis(500);

/// Bytes of the kernel image searched by the fallback scan.
pub const SCAN_LEN: usize = 0x0080_0000;

/// Highest age accepted by the fallback scan.
const SCAN_MAX_AGE: u32 = 0x20;

/// Bytes of the file name copied by the fallback scan (`ntxxxxxx.pdb`).
const SCAN_NAME_LEN: usize = 12;

/// Prefix of every bootstrap diagnostic.
const LIMITED_FUNCTIONALITY: &str = "WARNING: Functionality may be limited. Extended debug information disabled.";

/// Location of the running kernel image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelImage
{
    pub base: Address,
    pub size: u64,
}

impl KernelImage
{
    pub fn new(base: Address, size: u64) -> Self
    {
        Self { base, size }
    }
}

/// One bootstrap run, ready to execute on any thread
pub(crate) struct Bootstrap
{
    pub context: Arc<Context>,
    pub memory: Arc<dyn MemoryReader>,
    pub images: Arc<dyn ImageParser>,
    pub kernel: KernelImage,
    pub debug_info: Option<DebugInfoId>,
    pub started: Option<SyncSender<()>>,
}

impl Bootstrap
{
    /// Run to completion; the subsystem is enabled only on success.
    pub fn run(self) -> SymbolResult<SymbolHandle>
    {
        let context = Arc::clone(&self.context);
        let mut state = context.lock();
        if let Some(started) = &self.started {
            // The initiator may have stopped waiting already.
            let _ = started.try_send(());
        }

        if !self.memory.process_exists(ProcessId::SYSTEM) {
            return Err(diagnostic("Unable to locate the system process."));
        }

        let Some(debug_info) = self.kernel_debug_info() else {
            return Err(diagnostic("Unable to locate debugging information in kernel image."));
        };

        let Ok(kernel_size) = u32::try_from(self.kernel.size) else {
            return Err(diagnostic(&format!(
                "Kernel image size 0x{:x} is implausible.",
                self.kernel.size
            )));
        };

        let registration = ModuleRegistration::new(self.kernel.base, kernel_size, KERNEL_MODULE_NAME, debug_info);
        let handle = state.store.register(registration);

        if state.ensure_loaded(handle).is_err() {
            return Err(diagnostic("Unable to download kernel symbols to cache from Symbol Server."));
        }

        info!(
            "Initialization of debug symbol functionality completed [ {} ]",
            context.symbol_path
        );
        context.enable();
        Ok(handle)
    }

    fn kernel_debug_info(&self) -> Option<DebugInfoId>
    {
        if let Some(debug_info) = &self.debug_info {
            return Some(debug_info.clone());
        }
        if let Some(debug_info) = self.images.debug_info(ProcessId::SYSTEM, self.kernel.base) {
            return Some(debug_info);
        }
        if self.kernel.base.is_zero() {
            return None;
        }
        let image = self.memory.read_padded(ProcessId::SYSTEM, self.kernel.base, SCAN_LEN);
        scan_for_kernel_debug_info(&image)
    }
}

/// Search `image` for a kernel CodeView record.
///
/// Candidates sit at 4-byte aligned offsets, carry the `RSDS` signature and
/// an age of at most 0x20, and name a file of the form `ntxxxxxx.pdb`. The
/// first candidate wins.
pub fn scan_for_kernel_debug_info(image: &[u8]) -> Option<DebugInfoId>
{
    let record_len = RSDS_HEADER_LEN + SCAN_NAME_LEN + 1;
    let last = image.len().checked_sub(record_len)?;

    (0..=last).step_by(4).find_map(|offset| {
        if le_u32(image, offset)? != RSDS_SIGNATURE {
            return None;
        }
        let age = le_u32(image, offset + 20)?;
        if age > SCAN_MAX_AGE {
            return None;
        }
        let name = &image[offset + RSDS_HEADER_LEN..offset + record_len];
        if &name[..2] != b"nt" || &name[8..13] != b".pdb\0" {
            return None;
        }

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&image[offset + 4..offset + 20]);
        let file_name = String::from_utf8_lossy(&name[..SCAN_NAME_LEN]).into_owned();
        Some(DebugInfoId::new(file_name, Guid(guid), age))
    })
}

fn diagnostic(reason: &str) -> SymbolError
{
    warn!("{LIMITED_FUNCTIONALITY}\n         Reason: {reason}");
    SymbolError::Bootstrap(reason.to_string())
}
