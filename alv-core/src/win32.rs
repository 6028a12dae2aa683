//! Win32 implementation of [`MessageChannel`].
//!
//! Commands are registered window messages posted to the correlator's
//! top-level window; string payloads go through the clipboard as
//! `CF_TEXT` because the correlator does not read wide-character data.
//! Replies are broadcast by the correlator, so the mailbox is a hidden
//! top-level window (message-only windows do not receive broadcasts)
//! with its own message pump thread.

#![cfg(target_os = "windows")]

use std::ffi::c_void;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use windows::Win32::Foundation::*;
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Memory::{
    GMEM_MOVEABLE, GlobalAlloc, GlobalFree, GlobalLock, GlobalUnlock,
};
use windows::Win32::System::Ole::CF_TEXT;
use windows::Win32::UI::WindowsAndMessaging::*;
use windows::core::{PCWSTR, w};

use crate::channel::{Mailbox, MessageChannel, WindowHandle};
use crate::error::AlvError;
use crate::message::{Message, MessageTable, Payload, Signal};

const MAILBOX_CLASS: PCWSTR = w!("AlvBridgeMailbox");
const MAILBOX_TITLE: PCWSTR = w!("alv wait");

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn to_hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.raw() as *mut c_void)
}

fn platform(call: &'static str) -> impl Fn(windows::core::Error) -> AlvError {
    move |e| AlvError::Platform(format!("{call}: {e}"))
}

// ── Win32Channel ─────────────────────────────────────────────────

/// Talks to the correlator through registered window messages.
#[derive(Debug, Clone)]
pub struct Win32Channel {
    table: MessageTable,
}

impl Win32Channel {
    /// Register the correlator's message names with the system.
    pub fn new() -> Result<Self, AlvError> {
        let table = MessageTable::from_fn(|msg| {
            let name = wide(msg.registered_name());
            Ok(unsafe { RegisterWindowMessageW(PCWSTR(name.as_ptr())) })
        })?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &MessageTable {
        &self.table
    }
}

impl MessageChannel for Win32Channel {
    fn find_window(&self, title: &str) -> WindowHandle {
        let title = wide(title);
        match unsafe { FindWindowW(PCWSTR::null(), PCWSTR(title.as_ptr())) } {
            Ok(hwnd) => WindowHandle::from_raw(hwnd.0 as isize),
            Err(_) => WindowHandle::NULL,
        }
    }

    fn window_title(&self, handle: WindowHandle) -> Option<String> {
        let hwnd = to_hwnd(handle);
        if !unsafe { IsWindow(hwnd) }.as_bool() {
            return None;
        }
        let mut buffer = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd, &mut buffer) };
        Some(String::from_utf16_lossy(&buffer[..len.max(0) as usize]))
    }

    fn post(
        &self,
        handle: WindowHandle,
        message: Message,
        payload: Option<&Payload>,
    ) -> Result<(), AlvError> {
        let hwnd = to_hwnd(handle);
        if let Some(payload) = payload {
            copy_to_clipboard(hwnd, payload)?;
        }
        unsafe { PostMessageW(hwnd, self.table.id(message), WPARAM(0), LPARAM(0)) }
            .map_err(platform("PostMessageW"))
    }

    fn open_mailbox(&self, signals: Sender<Signal>) -> Result<Box<dyn Mailbox>, AlvError> {
        let mailbox = Win32Mailbox::open(self.table.clone(), signals)?;
        Ok(Box::new(mailbox))
    }
}

// ── Clipboard ────────────────────────────────────────────────────

fn copy_to_clipboard(owner: HWND, payload: &Payload) -> Result<(), AlvError> {
    debug!(data = %payload, "setting clipboard data");
    let bytes = payload.to_c_bytes();
    unsafe {
        OpenClipboard(owner).map_err(platform("OpenClipboard"))?;
        let result = fill_clipboard(&bytes);
        let _ = CloseClipboard();
        result
    }
}

/// Caller must hold the clipboard open.
unsafe fn fill_clipboard(bytes: &[u8]) -> Result<(), AlvError> {
    unsafe {
        EmptyClipboard().map_err(platform("EmptyClipboard"))?;
        let memory = GlobalAlloc(GMEM_MOVEABLE, bytes.len()).map_err(platform("GlobalAlloc"))?;
        let target = GlobalLock(memory) as *mut u8;
        if target.is_null() {
            let _ = GlobalFree(memory);
            return Err(AlvError::Platform("GlobalLock returned null".into()));
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), target, bytes.len());
        let _ = GlobalUnlock(memory);
        if let Err(e) = SetClipboardData(u32::from(CF_TEXT.0), HANDLE(memory.0)) {
            let _ = GlobalFree(memory);
            return Err(platform("SetClipboardData")(e));
        }
        // Ownership of `memory` passed to the clipboard.
    }
    Ok(())
}

// ── Mailbox ──────────────────────────────────────────────────────

struct MailboxContext {
    table: MessageTable,
    signals: Sender<Signal>,
}

// The context is boxed into GWLP_USERDATA and reclaimed on WM_NCDESTROY;
// only the pump thread touches it.
unsafe extern "system" fn mailbox_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let ctx_ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const MailboxContext;
    if !ctx_ptr.is_null() {
        let ctx = unsafe { &*ctx_ptr };
        if let Some(signal) = ctx.table.lookup(msg).and_then(Message::as_signal) {
            debug!(?signal, "reply received from correlator");
            let _ = ctx.signals.send(signal);
        }
    }

    match msg {
        WM_CLOSE => {
            let _ = unsafe { DestroyWindow(hwnd) };
            LRESULT(0)
        }
        WM_DESTROY => {
            unsafe { PostQuitMessage(0) };
            LRESULT(0)
        }
        WM_NCDESTROY => {
            let ptr = unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) } as *mut MailboxContext;
            if !ptr.is_null() {
                drop(unsafe { Box::from_raw(ptr) });
            }
            unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
        }
        _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    }
}

fn create_mailbox_window(ctx: MailboxContext) -> Result<HWND, AlvError> {
    let hinstance = unsafe { GetModuleHandleW(None) }.map_err(platform("GetModuleHandleW"))?;

    let wc = WNDCLASSW {
        lpfnWndProc: Some(mailbox_proc),
        hInstance: hinstance.into(),
        lpszClassName: MAILBOX_CLASS,
        ..Default::default()
    };
    // The class survives a close/init cycle.
    if unsafe { RegisterClassW(&wc) } == 0 && unsafe { GetLastError() } != ERROR_CLASS_ALREADY_EXISTS {
        return Err(AlvError::Platform("RegisterClassW failed".into()));
    }

    // Top-level but never shown.
    let hwnd = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            MAILBOX_CLASS,
            MAILBOX_TITLE,
            WS_OVERLAPPEDWINDOW,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            290,
            280,
            None,
            None,
            hinstance,
            None,
        )
    }
    .map_err(platform("CreateWindowExW"))?;

    let ctx_ptr = Box::into_raw(Box::new(ctx));
    unsafe {
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, ctx_ptr as isize);
    }
    Ok(hwnd)
}

fn run_message_pump() {
    let mut msg = MSG::default();
    loop {
        let status = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        // 0 on WM_QUIT, -1 on error
        if status.0 <= 0 {
            break;
        }
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Hidden reply window plus the thread pumping its messages.
struct Win32Mailbox {
    hwnd: isize,
    thread: JoinHandle<()>,
}

impl Win32Mailbox {
    fn open(table: MessageTable, signals: Sender<Signal>) -> Result<Self, AlvError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<isize, AlvError>>();
        let thread = thread::Builder::new()
            .name("alv-mailbox".into())
            .spawn(move || {
                let hwnd = match create_mailbox_window(MailboxContext { table, signals }) {
                    Ok(hwnd) => hwnd,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(hwnd.0 as isize));
                info!("mailbox window created");
                run_message_pump();
                debug!("mailbox pump exited");
            })?;

        match ready_rx.recv() {
            Ok(Ok(hwnd)) => Ok(Self { hwnd, thread }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AlvError::Platform("mailbox thread exited early".into()))
            }
        }
    }
}

impl Mailbox for Win32Mailbox {
    fn close(self: Box<Self>) {
        let this = *self;
        let hwnd = HWND(this.hwnd as *mut c_void);
        if let Err(e) = unsafe { PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)) } {
            warn!("failed to close mailbox window: {e}");
            return;
        }
        if this.thread.join().is_err() {
            warn!("mailbox thread panicked");
        }
    }
}
