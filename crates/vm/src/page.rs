//! Page descriptors.
//!
//! A [`Page`] records what belongs at one virtual page of an address space. It starts
//! out [`Uninit`], carrying the initializer that will fill its first frame, and turns
//! into an anonymous or file-backed page exactly once, the first time it is populated.

use alloc::sync::Arc;
use core::fmt;

use crate::frame::FrameId;
use crate::mmap::MappingId;
use crate::swap::{SwapSlot, SwapTable};
use crate::{File, IoError, VirtualAddress, VmError};

/// The concrete type a page has, or will have once populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Zero-filled memory backed by swap.
    Anonymous,
    /// Memory backed by a slice of a file.
    FileBacked,
}

/// Fills a freshly allocated frame the first time its page is touched.
///
/// The frame is exactly one page long and holds stale data on entry; the initializer
/// must write every byte.
pub type InitFn = fn(frame: &mut [u8], aux: &LoadAux) -> Result<(), VmError>;

/// Argument handed to an [`InitFn`].
///
/// Each page owns its copy, so duplicating an address space duplicates the argument
/// rather than sharing it.
#[derive(Clone, Default)]
pub struct LoadAux {
    pub file: Option<Arc<dyn File>>,
    pub offset: u64,
    pub read_bytes: usize,
    pub zero_bytes: usize,
}

impl fmt::Debug for LoadAux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadAux")
            .field("file", &self.file.is_some())
            .field("offset", &self.offset)
            .field("read_bytes", &self.read_bytes)
            .field("zero_bytes", &self.zero_bytes)
            .finish()
    }
}

/// Reads `aux.read_bytes` bytes of `aux.file` at `aux.offset` into the frame and zeroes
/// the rest of it.
pub fn load_file_slice(frame: &mut [u8], aux: &LoadAux) -> Result<(), VmError> {
    let file = aux.file.as_ref().ok_or(VmError::NoBackingFile)?;
    read_slice(file.as_ref(), frame, aux.offset, aux.read_bytes)
}

fn zero_fill(frame: &mut [u8], _aux: &LoadAux) -> Result<(), VmError> {
    frame.fill(0);
    Ok(())
}

fn read_slice(
    file: &dyn File,
    frame: &mut [u8],
    offset: u64,
    read_bytes: usize,
) -> Result<(), VmError> {
    let read = file.read_at(&mut frame[..read_bytes], offset)?;
    if read != read_bytes {
        return Err(IoError::ShortRead.into());
    }
    frame[read_bytes..].fill(0);
    Ok(())
}

/// A page that has never been populated.
#[derive(Clone)]
pub(crate) struct Uninit {
    target: PageType,
    init: Option<InitFn>,
    aux: LoadAux,
    mapping: Option<MappingId>,
}

impl Uninit {
    /// The initializer to run, falling back to the target type's default.
    fn initializer(&self) -> InitFn {
        match (self.init, self.target) {
            (Some(init), _) => init,
            (None, PageType::Anonymous) => zero_fill,
            (None, PageType::FileBacked) => load_file_slice,
        }
    }

    /// Builds the concrete payload the page turns into once its initializer succeeded.
    fn materialize(&self) -> Result<PageKind, VmError> {
        Ok(match self.target {
            PageType::Anonymous => PageKind::Anonymous(AnonPage { slot: None }),
            PageType::FileBacked => PageKind::FileBacked(FilePage {
                file: self.aux.file.clone().ok_or(VmError::NoBackingFile)?,
                offset: self.aux.offset,
                read_bytes: self.aux.read_bytes,
                mapping: self.mapping,
            }),
        })
    }
}

/// Anonymous page payload.
pub(crate) struct AnonPage {
    /// Where the page's contents live while it is evicted.
    slot: Option<SwapSlot>,
}

impl AnonPage {
    fn swap_in(&mut self, frame: &mut [u8], swap: &SwapTable) -> Result<(), VmError> {
        match self.slot {
            Some(slot) => {
                swap.swap_in(slot, frame)?;
                self.slot = None;
            }
            None => frame.fill(0),
        }
        Ok(())
    }
}

/// File-backed page payload.
pub(crate) struct FilePage {
    file: Arc<dyn File>,
    offset: u64,
    read_bytes: usize,
    mapping: Option<MappingId>,
}

impl FilePage {
    fn load(&self, frame: &mut [u8]) -> Result<(), VmError> {
        read_slice(self.file.as_ref(), frame, self.offset, self.read_bytes)
    }

    /// Writes the file-backed part of the frame back to the file.
    ///
    /// Writeback is per page: the whole `read_bytes` prefix is written, not only the
    /// bytes that changed.
    pub(crate) fn write_back(&self, frame: &[u8]) -> Result<(), VmError> {
        let written = self.file.write_at(&frame[..self.read_bytes], self.offset)?;
        if written != self.read_bytes {
            return Err(IoError::ShortWrite.into());
        }
        Ok(())
    }
}

pub(crate) enum PageKind {
    Uninit(Uninit),
    Anonymous(AnonPage),
    FileBacked(FilePage),
}

/// One virtual page of an address space.
pub(crate) struct Page {
    address: VirtualAddress,
    writable: bool,
    stack: bool,
    frame: Option<FrameId>,
    kind: PageKind,
}

impl Page {
    /// Creates an unpopulated page at the page containing `address`.
    pub(crate) fn new(
        address: VirtualAddress,
        writable: bool,
        target: PageType,
        init: Option<InitFn>,
        aux: LoadAux,
    ) -> Self {
        Self {
            address: address.page_base(),
            writable,
            stack: false,
            frame: None,
            kind: PageKind::Uninit(Uninit {
                target,
                init,
                aux,
                mapping: None,
            }),
        }
    }

    /// Creates an unpopulated page of a memory mapping.
    pub(crate) fn mapped(
        address: VirtualAddress,
        writable: bool,
        aux: LoadAux,
        mapping: MappingId,
    ) -> Self {
        let mut page = Self::new(
            address,
            writable,
            PageType::FileBacked,
            Some(load_file_slice),
            aux,
        );
        if let PageKind::Uninit(uninit) = &mut page.kind {
            uninit.mapping = Some(mapping);
        }
        page
    }

    /// Creates an anonymous stack page.
    pub(crate) fn stack(address: VirtualAddress) -> Self {
        let mut page = Self::new(address, true, PageType::Anonymous, None, LoadAux::default());
        page.stack = true;
        page
    }

    pub(crate) fn address(&self) -> VirtualAddress {
        self.address
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    pub(crate) fn is_stack(&self) -> bool {
        self.stack
    }

    pub(crate) fn is_initialized(&self) -> bool {
        !matches!(self.kind, PageKind::Uninit(_))
    }

    pub(crate) fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// Only [`FrameTable`](crate::frame::FrameTable) moves this, keeping both links in step.
    pub(crate) fn set_frame(&mut self, frame: Option<FrameId>) {
        self.frame = frame;
    }

    pub(crate) fn kind(&self) -> &PageKind {
        &self.kind
    }

    /// The effective type: the current one, or the target type while uninitialized.
    pub(crate) fn page_type(&self) -> PageType {
        match &self.kind {
            PageKind::Uninit(uninit) => uninit.target,
            PageKind::Anonymous(_) => PageType::Anonymous,
            PageKind::FileBacked(_) => PageType::FileBacked,
        }
    }

    /// The mapping this page belongs to, if any.
    pub(crate) fn mapping(&self) -> Option<MappingId> {
        match &self.kind {
            PageKind::Uninit(uninit) => uninit.mapping,
            PageKind::Anonymous(_) => None,
            PageKind::FileBacked(file) => file.mapping,
        }
    }

    pub(crate) fn swap_slot(&self) -> Option<SwapSlot> {
        match &self.kind {
            PageKind::Anonymous(anon) => anon.slot,
            _ => None,
        }
    }

    /// Fills `frame` with the page's contents.
    ///
    /// An uninitialized page runs its initializer and becomes its target type; on
    /// failure it stays uninitialized. A swapped-out anonymous page keeps its slot if
    /// the read fails.
    pub(crate) fn populate(&mut self, frame: &mut [u8], swap: &SwapTable) -> Result<(), VmError> {
        match &mut self.kind {
            PageKind::Uninit(uninit) => {
                (uninit.initializer())(frame, &uninit.aux)?;
                let next = uninit.materialize()?;
                self.kind = next;
                Ok(())
            }
            PageKind::Anonymous(anon) => anon.swap_in(frame, swap),
            PageKind::FileBacked(file) => file.load(frame),
        }
    }

    /// Moves the contents of `frame` to the page's backing store.
    ///
    /// # Panics
    /// Panics if the page was never populated, since such a page cannot own a frame.
    pub(crate) fn evict(&mut self, frame: &[u8], dirty: bool, swap: &SwapTable) -> Result<(), VmError> {
        match &mut self.kind {
            PageKind::Uninit(_) => panic!("uninitialized page {} owns a frame", self.address),
            PageKind::Anonymous(anon) => {
                debug_assert!(anon.slot.is_none(), "resident page already has a swap slot");
                anon.slot = Some(swap.swap_out(frame)?);
                Ok(())
            }
            PageKind::FileBacked(file) if dirty => file.write_back(frame),
            PageKind::FileBacked(_) => Ok(()),
        }
    }

    /// Releases the page's swap slot, if it holds one.
    pub(crate) fn release_backing(&mut self, swap: &SwapTable) {
        if let PageKind::Anonymous(anon) = &mut self.kind
            && let Some(slot) = anon.slot.take()
        {
            swap.free(slot);
        }
    }

    /// Copies a never-populated page for another address space.
    pub(crate) fn duplicate_uninit(&self) -> Option<Self> {
        match &self.kind {
            PageKind::Uninit(uninit) => Some(Self {
                address: self.address,
                writable: self.writable,
                stack: self.stack,
                frame: None,
                kind: PageKind::Uninit(uninit.clone()),
            }),
            _ => None,
        }
    }

    /// An empty, already-initialized anonymous page with the same attributes, ready to
    /// receive a copy of this page's frame.
    pub(crate) fn duplicate_anonymous(&self) -> Self {
        Self {
            address: self.address,
            writable: self.writable,
            stack: self.stack,
            frame: None,
            kind: PageKind::Anonymous(AnonPage { slot: None }),
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("address", &self.address)
            .field("type", &self.page_type())
            .field("initialized", &self.is_initialized())
            .field("writable", &self.writable)
            .field("frame", &self.frame)
            .finish()
    }
}
