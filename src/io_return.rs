//! Platform status codes and their human-readable descriptions.
//!
//! The numeric values are the IOKit `kIOReturn*` codes
//! (`sys_iokit | sub_iokit_common | code`). Other platforms map their own
//! failures onto the closest code.

use std::fmt;

const fn iokit_common_err(code: u32) -> i32 {
    (0xe000_0000u32 | code) as i32
}

/// Status returned by platform HID calls.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoReturn(pub i32);

macro_rules! io_returns {
    ( $( $name:ident = $value:expr => $desc:literal ),+ $(,)? ) => {
        #[allow(non_upper_case_globals)]
        impl IoReturn {
            $(
                pub const $name: IoReturn = IoReturn($value);
            )+

            /// Every named status code.
            pub const ALL: &'static [IoReturn] = &[ $( IoReturn::$name ),+ ];

            /// Static description of the status code, `"<unknown>"` for codes
            /// this table does not know about.
            pub const fn describe(self) -> &'static str {
                match self.0 {
                    $(
                        v if v == $value => $desc,
                    )+
                    _ => "<unknown>",
                }
            }
        }
    };
}

io_returns! {
    Success = 0 => "OK",
    Error = iokit_common_err(0x2bc) => "general error",
    NoMemory = iokit_common_err(0x2bd) => "can't allocate memory",
    NoResources = iokit_common_err(0x2be) => "resource shortage",
    IPCError = iokit_common_err(0x2bf) => "error during IPC",
    NoDevice = iokit_common_err(0x2c0) => "no such device",
    NotPrivileged = iokit_common_err(0x2c1) => "privilege violation",
    BadArgument = iokit_common_err(0x2c2) => "invalid argument",
    LockedRead = iokit_common_err(0x2c3) => "device read locked",
    LockedWrite = iokit_common_err(0x2c4) => "device write locked",
    ExclusiveAccess = iokit_common_err(0x2c5) => "exclusive access and device already open",
    BadMessageID = iokit_common_err(0x2c6) => "sent/received messages had different msg_id",
    Unsupported = iokit_common_err(0x2c7) => "unsupported function",
    VMError = iokit_common_err(0x2c8) => "misc. VM failure",
    InternalError = iokit_common_err(0x2c9) => "internal error",
    IOError = iokit_common_err(0x2ca) => "General I/O error",
    CannotLock = iokit_common_err(0x2cc) => "can't acquire lock",
    NotOpen = iokit_common_err(0x2cd) => "device not open",
    NotReadable = iokit_common_err(0x2ce) => "read not supported",
    NotWritable = iokit_common_err(0x2cf) => "write not supported",
    NotAligned = iokit_common_err(0x2d0) => "alignment error",
    BadMedia = iokit_common_err(0x2d1) => "Media Error",
    StillOpen = iokit_common_err(0x2d2) => "device(s) still open",
    RLDError = iokit_common_err(0x2d3) => "rld failure",
    DMAError = iokit_common_err(0x2d4) => "DMA failure",
    Busy = iokit_common_err(0x2d5) => "Device Busy",
    Timeout = iokit_common_err(0x2d6) => "I/O Timeout",
    Offline = iokit_common_err(0x2d7) => "device offline",
    NotReady = iokit_common_err(0x2d8) => "not ready",
    NotAttached = iokit_common_err(0x2d9) => "device not attached",
    NoChannels = iokit_common_err(0x2da) => "no DMA channels left",
    NoSpace = iokit_common_err(0x2db) => "no space for data",
    PortExists = iokit_common_err(0x2dd) => "port already exists",
    CannotWire = iokit_common_err(0x2de) => "can't wire down physical memory",
    NoInterrupt = iokit_common_err(0x2df) => "no interrupt attached",
    NoFrames = iokit_common_err(0x2e0) => "no DMA frames enqueued",
    MessageTooLarge = iokit_common_err(0x2e1) => "oversized msg received on interrupt port",
    NotPermitted = iokit_common_err(0x2e2) => "not permitted",
    NoPower = iokit_common_err(0x2e3) => "no power to device",
    NoMedia = iokit_common_err(0x2e4) => "media not present",
    UnformattedMedia = iokit_common_err(0x2e5) => "media not formatted",
    UnsupportedMode = iokit_common_err(0x2e6) => "no such mode",
    Underrun = iokit_common_err(0x2e7) => "data underrun",
    Overrun = iokit_common_err(0x2e8) => "data overrun",
    DeviceError = iokit_common_err(0x2e9) => "the device is not working properly!",
    NoCompletion = iokit_common_err(0x2ea) => "a completion routine is required",
    Aborted = iokit_common_err(0x2eb) => "operation aborted",
    NoBandwidth = iokit_common_err(0x2ec) => "bus bandwidth would be exceeded",
    NotResponding = iokit_common_err(0x2ed) => "device not responding",
    IsoTooOld = iokit_common_err(0x2ee) => "isochronous I/O request for distant past!",
    IsoTooNew = iokit_common_err(0x2ef) => "isochronous I/O request for distant future",
    NotFound = iokit_common_err(0x2f0) => "data was not found",
    Invalid = iokit_common_err(0x1) => "should never be seen",
}

impl IoReturn {
    pub const fn is_success(self) -> bool {
        self.0 == IoReturn::Success.0
    }
}

impl fmt::Display for IoReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.describe(), self.0)
    }
}

impl fmt::Debug for IoReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IoReturn({:#010x})", self.0)
    }
}
