use crate::error::FboxError;
use crate::Core::addr::{RelativeAddr, SegmentTable};
use crate::Core::alloc::ShmFboxPool;
use crate::Core::create_anonymous_shared_memory;
use crate::FBox::{
    Delivery, EndpointId, FboxAnnouncement, FboxConfig, FboxContext, FboxPolicy, GenericPath,
    SendPath,
};
use log::error;
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;

// Error codes
const FBOX_SUCCESS: i32 = 0;
const FBOX_ERROR_NULL_POINTER: i32 = -1;
const FBOX_ERROR_INVALID_ARG: i32 = -2;
const FBOX_ERROR_INVALID_TAG: i32 = -3;
const FBOX_ERROR_UNKNOWN_ENDPOINT: i32 = -4;
const FBOX_ERROR_CORRUPT: i32 = -5;
const FBOX_ERROR_BAD_ADDRESS: i32 = -6;
const FBOX_ERROR_GENERIC_PATH: i32 = -7;
const FBOX_ERROR_INTERNAL: i32 = -8;

// Send results
const FBOX_SENT_GENERIC: i32 = 0;
const FBOX_SENT_FAST: i32 = 1;

fn error_code(e: &FboxError) -> i32 {
    match e {
        FboxError::InvalidConfig(_) => FBOX_ERROR_INVALID_ARG,
        FboxError::InvalidTag(_) => FBOX_ERROR_INVALID_TAG,
        FboxError::UnknownEndpoint(_) => FBOX_ERROR_UNKNOWN_ENDPOINT,
        FboxError::Corrupt { .. } => FBOX_ERROR_CORRUPT,
        FboxError::BadRelativeAddress(_) => FBOX_ERROR_BAD_ADDRESS,
        FboxError::AlreadyMapped(_) => FBOX_ERROR_INVALID_ARG,
        FboxError::GenericPath(_) => FBOX_ERROR_GENERIC_PATH,
        FboxError::Io(_) => FBOX_ERROR_INTERNAL,
    }
}

/// Generic-path send callback. `announce` is 0 when the send carries no fast
/// box announcement, otherwise the packed relocatable address of the new box.
/// A non-zero return is reported back to the caller of `fbox_send`.
pub type FboxGenericSendFn = unsafe extern "C" fn(
    cbdata: *mut c_void,
    endpoint: usize,
    tag: u16,
    header: *const u8,
    header_len: usize,
    payload: *const u8,
    payload_len: usize,
    announce: u64,
) -> i32;

/// Called for escape records: `frag` is the local address of the fragment
/// descriptor, `rel` its packed relocatable address.
pub type FboxFragFn =
    unsafe extern "C" fn(cbdata: *mut c_void, endpoint: usize, frag: *mut u8, rel: u64) -> i32;

/// Tag handler. `data` is only valid for the duration of the call.
pub type FboxHandlerFn =
    unsafe extern "C" fn(cbdata: *mut c_void, endpoint: usize, tag: u16, seq: u16, data: *const u8, len: usize);

/// Opaque user pointer handed back to callbacks.
#[derive(Clone, Copy)]
struct CbData(*mut c_void);

// The C side owns whatever cbdata points to and promises it may be used from
// the polling thread.
unsafe impl Send for CbData {}
unsafe impl Sync for CbData {}

struct CallbackPath {
    send: FboxGenericSendFn,
    frag: FboxFragFn,
    cbdata: CbData,
}

impl GenericPath for CallbackPath {
    fn send(
        &self,
        endpoint: EndpointId,
        tag: u16,
        header: &[u8],
        payload: &[u8],
        announcement: Option<FboxAnnouncement>,
    ) -> crate::Result<()> {
        let announce = announcement.map_or(0, |a| a.base.to_bits());
        let rc = unsafe {
            (self.send)(
                self.cbdata.0,
                endpoint.0,
                tag,
                header.as_ptr(),
                header.len(),
                payload.as_ptr(),
                payload.len(),
                announce,
            )
        };
        match rc {
            0 => Ok(()),
            rc => Err(FboxError::GenericPath(rc)),
        }
    }

    fn handle_frag(&self, endpoint: EndpointId, frag: NonNull<u8>, addr: RelativeAddr) -> crate::Result<()> {
        let rc = unsafe { (self.frag)(self.cbdata.0, endpoint.0, frag.as_ptr(), addr.to_bits()) };
        match rc {
            0 => Ok(()),
            rc => Err(FboxError::GenericPath(rc)),
        }
    }
}

/// Handle to a fast-box pool and the segment table it is registered in
/// (opaque pointer). Contexts created from the same domain share both.
pub struct DomainHandle {
    pool: Arc<ShmFboxPool>,
    segments: Arc<SegmentTable>,
}

/// Handle to a fast-box context (opaque pointer)
pub struct ContextHandle {
    inner: FboxContext,
}

/// Counters of one `fbox_poll` call.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FboxPollStatus {
    pub records: u32,
    pub delivered: u32,
    pub forwarded: u32,
    pub unhandled: u32,
    pub dropped: u64,
}

// -----------------------------------------------------------------------------
// Domain API
// -----------------------------------------------------------------------------

/// Create a pool of `max_blocks` fast-box blocks in a fresh anonymous segment,
/// registered as segment 0.
///
/// # Arguments
/// * `block_size` - Size of each block; a multiple of 32.
/// * `max_blocks` - Number of blocks to carve out.
///
/// # Returns
/// * Pointer to `DomainHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn fbox_domain_new(block_size: u32, max_blocks: u32) -> *mut DomainHandle {
    let size = ShmFboxPool::required_size(block_size, max_blocks);

    let pool = create_anonymous_shared_memory(size)
        .and_then(|shm| ShmFboxPool::new(shm, 0, block_size, max_blocks));

    match pool {
        Ok(pool) => {
            let segments = SegmentTable::new();
            segments.register(pool.segment_id(), pool.shm().as_ptr(), pool.shm().size());
            Box::into_raw(Box::new(DomainHandle {
                pool: Arc::new(pool),
                segments: Arc::new(segments),
            }))
        }
        Err(e) => {
            error!("FFI Error: Failed to create fast-box pool: {}", e);
            ptr::null_mut()
        }
    }
}

/// Free a domain handle. Contexts created from it keep the pool alive.
#[no_mangle]
pub extern "C" fn fbox_domain_free(handle: *mut DomainHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle); // Dropped automatically
        }
    }
}

// -----------------------------------------------------------------------------
// Context API
// -----------------------------------------------------------------------------

/// Create a new context drawing fast boxes from `domain`.
///
/// # Arguments
/// * `domain` - Pointer to `DomainHandle`.
/// * `policy` - 0 for reliable, 1 for overwrite.
/// * `threshold` - Generic-path sends before an endpoint is promoted.
/// * `send` / `frag` - Generic-path callbacks.
/// * `cbdata` - Passed back to both callbacks.
///
/// # Returns
/// * Pointer to `ContextHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn fbox_context_new(
    domain: *const DomainHandle,
    policy: u32,
    threshold: u32,
    send: Option<FboxGenericSendFn>,
    frag: Option<FboxFragFn>,
    cbdata: *mut c_void,
) -> *mut ContextHandle {
    let (Some(send), Some(frag)) = (send, frag) else {
        return ptr::null_mut();
    };
    if domain.is_null() {
        return ptr::null_mut();
    }
    let domain = unsafe { &*domain };

    let policy = match policy {
        0 => FboxPolicy::Reliable,
        1 => FboxPolicy::Overwrite,
        other => {
            error!("FFI Error: Unknown fast-box policy {}", other);
            return ptr::null_mut();
        }
    };

    let context = FboxConfig::builder()
        .with_policy(policy)
        .with_threshold(threshold as usize)
        .build()
        .and_then(|config| {
            FboxContext::new(
                config,
                domain.pool.clone(),
                domain.segments.clone(),
                Arc::new(CallbackPath {
                    send,
                    frag,
                    cbdata: CbData(cbdata),
                }),
            )
        });

    match context {
        Ok(inner) => Box::into_raw(Box::new(ContextHandle { inner })),
        Err(e) => {
            error!("FFI Error: Failed to build fast-box context: {}", e);
            ptr::null_mut()
        }
    }
}

/// Free a context handle.
#[no_mangle]
pub extern "C" fn fbox_context_free(handle: *mut ContextHandle) {
    if !handle.is_null() {
        unsafe {
            let _ = Box::from_raw(handle);
        }
    }
}

/// Add an endpoint towards a peer that accepts up to `fbox_max` fast boxes.
///
/// # Returns
/// * Endpoint id (>= 0), or a negative error code.
#[no_mangle]
pub extern "C" fn fbox_add_endpoint(handle: *mut ContextHandle) -> isize {
    if handle.is_null() {
        return FBOX_ERROR_NULL_POINTER as isize;
    }
    let ctx = unsafe { &mut (*handle).inner };
    let credits = ctx.new_peer_credits();
    ctx.add_endpoint(credits).0 as isize
}

/// Register `handler` for `tag` (1..=0xfd).
#[no_mangle]
pub extern "C" fn fbox_register_handler(
    handle: *mut ContextHandle,
    tag: u16,
    handler: Option<FboxHandlerFn>,
    cbdata: *mut c_void,
) -> i32 {
    let Some(handler) = handler else {
        return FBOX_ERROR_NULL_POINTER;
    };
    if handle.is_null() {
        return FBOX_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &mut (*handle).inner };
    let cbdata = CbData(cbdata);

    let registered = ctx.register_handler(tag, move |d: &Delivery<'_>| unsafe {
        let cbdata = cbdata;
        handler(cbdata.0, d.endpoint.0, d.tag, d.seq, d.segment.as_ptr(), d.segment.len())
    });
    match registered {
        Ok(()) => FBOX_SUCCESS,
        Err(e) => error_code(&e),
    }
}

/// Send a message.
///
/// # Returns
/// * 1 when the message went through the fast box.
/// * 0 when it went through the generic path.
/// * Negative error code otherwise.
#[no_mangle]
pub extern "C" fn fbox_send(
    handle: *mut ContextHandle,
    endpoint: usize,
    tag: u16,
    header: *const u8,
    header_len: usize,
    payload: *const u8,
    payload_len: usize,
) -> i32 {
    if handle.is_null() || (header.is_null() && header_len > 0) || (payload.is_null() && payload_len > 0) {
        return FBOX_ERROR_NULL_POINTER;
    }

    let ctx = unsafe { &mut (*handle).inner };
    let header = if header_len == 0 { &[][..] } else { unsafe { std::slice::from_raw_parts(header, header_len) } };
    let payload =
        if payload_len == 0 { &[][..] } else { unsafe { std::slice::from_raw_parts(payload, payload_len) } };

    match ctx.send(EndpointId(endpoint), tag, header, payload) {
        Ok(SendPath::Fast) => FBOX_SENT_FAST,
        Ok(SendPath::Generic { .. }) => FBOX_SENT_GENERIC,
        Err(e) => error_code(&e),
    }
}

/// Map the fast box a peer announced with `fbox_send`'s `announce` value.
#[no_mangle]
pub extern "C" fn fbox_setup_recv(handle: *mut ContextHandle, endpoint: usize, announce: u64) -> i32 {
    if handle.is_null() {
        return FBOX_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &mut (*handle).inner };

    match ctx.setup_fbox_recv(EndpointId(endpoint), RelativeAddr::from_bits(announce)) {
        Ok(()) => FBOX_SUCCESS,
        Err(e) => error_code(&e),
    }
}

/// Poll all inbound fast boxes once. Handlers run before this returns.
///
/// # Arguments
/// * `out_status` - Optional; receives the counters of this poll.
///
/// # Returns
/// * Number of records consumed, or a negative error code.
#[no_mangle]
pub extern "C" fn fbox_poll(handle: *mut ContextHandle, out_status: *mut FboxPollStatus) -> i32 {
    if handle.is_null() {
        return FBOX_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &mut (*handle).inner };

    match ctx.poll() {
        Ok(status) => {
            if !out_status.is_null() {
                unsafe {
                    *out_status = FboxPollStatus {
                        records: status.records,
                        delivered: status.delivered,
                        forwarded: status.forwarded,
                        unhandled: status.unhandled,
                        dropped: status.dropped,
                    };
                }
            }
            status.records.min(i32::MAX as u32) as i32
        }
        Err(e) => error_code(&e),
    }
}

/// Give an endpoint's outbound fast box back to the pool.
///
/// # Returns
/// * 1 if a fast box was released, 0 if the endpoint had none.
#[no_mangle]
pub extern "C" fn fbox_release(handle: *mut ContextHandle, endpoint: usize) -> i32 {
    if handle.is_null() {
        return FBOX_ERROR_NULL_POINTER;
    }
    let ctx = unsafe { &mut (*handle).inner };

    match ctx.release_fbox(EndpointId(endpoint)) {
        Ok(released) => released as i32,
        Err(e) => error_code(&e),
    }
}
