use std::ffi::{c_char, CStr, CString};

/// Copies a null terminated C string returned by the driver into an owned string.
/// Null pointers become an empty string.
pub(crate) unsafe fn wrap_c_str(s: *const c_char) -> String {
    if s.is_null() {
        return String::new();
    }
    CStr::from_ptr(s).to_string_lossy().into_owned()
}

/// Borrows the raw pointers of a list of C strings. The pointers live as long as `strings` does.
pub(crate) fn unwrap_to_raw_strings(strings: &[CString]) -> Vec<*const c_char> {
    strings.iter().map(|string| string.as_ptr()).collect()
}
