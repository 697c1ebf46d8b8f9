//! [`HostModel`] over late-bound COM automation (`IDispatch`).
//!
//! Every `IDispatch` pointer the host hands out is stored under a fresh
//! [`HandleId`]; releasing the handle drops the pointer, which calls
//! `IUnknown::Release`. The host must be used on the apartment thread that
//! created it, which `ComHost` being `!Send` enforces.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;

use chrono::{NaiveDateTime, TimeDelta};
use windows::Win32::Foundation::VARIANT_BOOL;
use windows::Win32::System::Com::{
    CLSCTX_LOCAL_SERVER, CLSIDFromProgID, CoCreateInstance, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO, IDispatch,
};
use windows::Win32::System::Ole::DISPID_PROPERTYPUT;
use windows::Win32::System::Variant::{
    VARIANT, VT_BOOL, VT_BSTR, VT_DATE, VT_DISPATCH, VT_I4, VT_I8, VT_R8, VariantClear,
};
use windows::core::{BSTR, GUID, PCWSTR};

use crate::errors::{HostFault, HostResult};
use crate::handle::{HandleId, HostModel};
use crate::value::{FromHostValue, HostValue};

const LOCALE_USER_DEFAULT: u32 = 0x0400;

#[allow(clippy::cast_possible_wrap)]
const DISP_E_EXCEPTION: i32 = 0x8002_0009_u32 as i32;
#[allow(clippy::cast_possible_wrap)]
const DISP_E_TYPEMISMATCH: i32 = 0x8002_0005_u32 as i32;

/// Days from the OLE automation epoch (1899-12-30) to 1970-01-01.
const OLE_EPOCH_DAYS: i64 = 25569;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

impl From<windows::core::Error> for HostFault {
    fn from(err: windows::core::Error) -> Self {
        Self::new(err.code().0, err.message())
    }
}

fn type_mismatch(message: impl Into<String>) -> HostFault {
    HostFault::new(DISP_E_TYPEMISMATCH, message)
}

/// Servers report `Count` as any integral VARIANT, sometimes `VT_R8`.
fn count_from_value(value: HostValue) -> HostResult<usize> {
    usize::from_host_value(value).map_err(|err| type_mismatch(format!("Count: {err}")))
}

fn ole_epoch() -> NaiveDateTime {
    NaiveDateTime::UNIX_EPOCH - TimeDelta::days(OLE_EPOCH_DAYS)
}

/// OLE automation date: days since 1899-12-30, fraction is time of day.
#[allow(clippy::cast_possible_truncation)]
fn ole_date_to_naive(ole_date: f64) -> HostResult<NaiveDateTime> {
    let millis = (ole_date * MILLIS_PER_DAY).round();
    if !millis.is_finite() {
        return Err(type_mismatch(format!("OLE date {ole_date} is not finite")));
    }
    TimeDelta::try_milliseconds(millis as i64)
        .and_then(|offset| ole_epoch().checked_add_signed(offset))
        .ok_or_else(|| type_mismatch(format!("OLE date {ole_date} out of range")))
}

#[allow(clippy::cast_precision_loss)]
fn naive_to_ole_date(value: NaiveDateTime) -> f64 {
    (value - ole_epoch()).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// A `VARIANT` that is cleared with `VariantClear` when dropped.
#[repr(transparent)]
#[derive(Default)]
struct OwnedVariant(VARIANT);

impl OwnedVariant {
    fn from_host_value(value: &HostValue) -> Self {
        let mut variant = VARIANT::default();
        // SAFETY: the `vt` discriminant and its matching union arm are set
        // together on a VARIANT we own. The BSTR is owned by the VARIANT and
        // freed by `VariantClear` in Drop.
        unsafe {
            let inner = &mut *variant.Anonymous.Anonymous;
            match value {
                HostValue::Empty => {}
                HostValue::Bool(b) => {
                    inner.vt = VT_BOOL;
                    inner.Anonymous.boolVal = VARIANT_BOOL(if *b { -1 } else { 0 });
                }
                HostValue::Int(i) => {
                    if let Ok(small) = i32::try_from(*i) {
                        inner.vt = VT_I4;
                        inner.Anonymous.lVal = small;
                    } else {
                        inner.vt = VT_I8;
                        inner.Anonymous.llVal = *i;
                    }
                }
                HostValue::Float(f) => {
                    inner.vt = VT_R8;
                    inner.Anonymous.dblVal = *f;
                }
                HostValue::Text(s) => {
                    inner.vt = VT_BSTR;
                    inner.Anonymous.bstrVal = ManuallyDrop::new(BSTR::from(s.as_str()));
                }
                HostValue::Date(d) => {
                    inner.vt = VT_DATE;
                    inner.Anonymous.date = naive_to_ole_date(*d);
                }
            }
        }
        Self(variant)
    }

    fn vt(&self) -> u16 {
        // SAFETY: `vt` is valid for every initialized VARIANT.
        unsafe { self.0.Anonymous.Anonymous.vt.0 }
    }

    /// Converts a scalar result. Object results are a type mismatch here.
    #[allow(clippy::cast_possible_wrap)]
    fn to_host_value(&self) -> HostResult<HostValue> {
        let vt = self.vt();
        // SAFETY: the VARIANT came back from `IDispatch::Invoke`, so `vt`
        // identifies the active union arm that is read below.
        unsafe {
            let arm = &self.0.Anonymous.Anonymous.Anonymous;
            Ok(match vt {
                0 | 1 => HostValue::Empty,                      // VT_EMPTY, VT_NULL
                2 => HostValue::Int(i64::from(arm.iVal)),       // VT_I2
                3 => HostValue::Int(i64::from(arm.lVal)),       // VT_I4
                4 => HostValue::Float(f64::from(arm.fltVal)),   // VT_R4
                5 => HostValue::Float(arm.dblVal),              // VT_R8
                6 => {
                    // VT_CY - 64-bit fixed-point scaled by 10,000
                    #[allow(clippy::cast_precision_loss)]
                    let raw = arm.cyVal.int64 as f64;
                    HostValue::Float(raw / 10_000.0)
                }
                7 => HostValue::Date(ole_date_to_naive(arm.date)?), // VT_DATE
                8 => HostValue::Text(arm.bstrVal.to_string()),      // VT_BSTR
                11 => HostValue::Bool(arm.boolVal.0 != 0),          // VT_BOOL
                16 => HostValue::Int(i64::from(arm.bVal as i8)),    // VT_I1
                17 => HostValue::Int(i64::from(arm.bVal)),          // VT_UI1
                18 => HostValue::Int(i64::from(arm.uiVal)),         // VT_UI2
                19 | 23 => HostValue::Int(i64::from(arm.ulVal)),    // VT_UI4, VT_UINT
                20 => HostValue::Int(arm.llVal),                    // VT_I8
                22 => HostValue::Int(i64::from(arm.intVal)),        // VT_INT
                9 => return Err(type_mismatch("object returned where a value was expected")),
                other => return Err(type_mismatch(format!("unsupported VARIANT type {other}"))),
            })
        }
    }

    /// A new reference to the contained `IDispatch`, if this holds one.
    fn dispatch(&self) -> Option<IDispatch> {
        if self.vt() != VT_DISPATCH.0 {
            return None;
        }
        // SAFETY: `vt` is VT_DISPATCH, so `pdispVal` is the active arm.
        // Cloning adds a reference; the VARIANT keeps and later clears its own.
        unsafe { (*self.0.Anonymous.Anonymous.Anonymous.pdispVal).clone() }
    }
}

impl Drop for OwnedVariant {
    fn drop(&mut self) {
        // SAFETY: the VARIANT is initialized (default or filled by us or the
        // server) and owned by this wrapper; clearing it releases any BSTR
        // or interface it holds exactly once.
        if let Err(e) = unsafe { VariantClear(&raw mut self.0) } {
            tracing::warn!(error = ?e, "VariantClear failed");
        }
    }
}

/// Late-bound COM host. One instance per apartment thread.
pub struct ComHost {
    objects: RefCell<HashMap<HandleId, IDispatch>>,
    next: Cell<u64>,
    _not_send: PhantomData<*mut ()>,
}

impl ComHost {
    pub fn new() -> Self {
        Self {
            objects: RefCell::new(HashMap::new()),
            next: Cell::new(0),
            _not_send: PhantomData,
        }
    }

    /// Starts (or attaches to) a local automation server by `ProgID` and
    /// returns a handle to its root object.
    ///
    /// # Errors
    ///
    /// Returns the fault from `CLSIDFromProgID` or `CoCreateInstance`.
    pub fn launch(&self, prog_id: &str) -> HostResult<HandleId> {
        let wide: Vec<u16> = prog_id.encode_utf16().chain(std::iter::once(0)).collect();
        // SAFETY: `wide` is null-terminated and outlives the call.
        let clsid = unsafe { CLSIDFromProgID(PCWSTR(wide.as_ptr())) }.map_err(|e| {
            tracing::error!(error = ?e, prog_id, "ProgID lookup failed");
            HostFault::from(e)
        })?;
        // SAFETY: plain activation call with no aggregation. The COM
        // apartment was entered by the owning thread's `ComGuard`.
        let root: IDispatch = unsafe { CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER) }
            .map_err(|e| {
                tracing::error!(error = ?e, prog_id, "CoCreateInstance failed");
                HostFault::from(e)
            })?;
        let handle = self.adopt(root);
        tracing::info!(prog_id, %handle, "automation server launched");
        Ok(handle)
    }

    /// Stores an interface pointer obtained elsewhere under a new handle.
    pub fn adopt(&self, dispatch: IDispatch) -> HandleId {
        let id = HandleId(self.next.get() + 1);
        self.next.set(id.0);
        self.objects.borrow_mut().insert(id, dispatch);
        id
    }

    /// Number of interface pointers still held.
    pub fn live_objects(&self) -> usize {
        self.objects.borrow().len()
    }

    fn object(&self, handle: HandleId) -> HostResult<IDispatch> {
        self.objects
            .borrow()
            .get(&handle)
            .cloned()
            .ok_or_else(HostFault::disconnected)
    }

    fn dispid(dispatch: &IDispatch, name: &str) -> HostResult<i32> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0_i32;
        // SAFETY: one name in, one DISPID out; both buffers outlive the call.
        unsafe {
            dispatch.GetIDsOfNames(
                &GUID::zeroed(),
                names.as_ptr(),
                1,
                LOCALE_USER_DEFAULT,
                &raw mut dispid,
            )
        }?;
        Ok(dispid)
    }

    fn invoke(
        &self,
        handle: HandleId,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[HostValue],
    ) -> HostResult<OwnedVariant> {
        let dispatch = self.object(handle)?;
        let dispid = Self::dispid(&dispatch, name)?;

        // DISPPARAMS lists arguments last to first.
        let mut argv: Vec<OwnedVariant> =
            args.iter().rev().map(OwnedVariant::from_host_value).collect();
        let mut named = DISPID_PROPERTYPUT;
        let is_put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: if argv.is_empty() {
                ptr::null_mut()
            } else {
                argv.as_mut_ptr().cast::<VARIANT>()
            },
            rgdispidNamedArgs: if is_put {
                &raw mut named
            } else {
                ptr::null_mut()
            },
            cArgs: u32::try_from(argv.len())
                .map_err(|_| type_mismatch("too many arguments"))?,
            cNamedArgs: u32::from(is_put),
        };

        let mut result = OwnedVariant::default();
        let mut excep = EXCEPINFO::default();
        let mut arg_err = 0_u32;
        // SAFETY: `params` points into `argv` and `named`, which outlive the
        // call. `OwnedVariant` is repr(transparent) over VARIANT. Out
        // pointers reference locals that are valid for the call.
        let outcome = unsafe {
            dispatch.Invoke(
                dispid,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &raw const params,
                Some(&raw mut result.0),
                Some(&raw mut excep),
                Some(&raw mut arg_err),
            )
        };

        match outcome {
            Ok(()) => Ok(result),
            Err(e) if e.code().0 == DISP_E_EXCEPTION => {
                let code = if excep.scode == 0 {
                    e.code().0
                } else {
                    excep.scode
                };
                let description = excep.bstrDescription.to_string();
                tracing::debug!(member = name, code, %description, "automation exception");
                Err(HostFault::new(
                    code,
                    if description.is_empty() {
                        e.message()
                    } else {
                        description
                    },
                ))
            }
            Err(e) => {
                tracing::debug!(member = name, error = ?e, arg_err, "Invoke failed");
                Err(e.into())
            }
        }
    }
}

impl Default for ComHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComHost")
            .field("live_objects", &self.live_objects())
            .finish()
    }
}

impl HostModel for ComHost {
    fn create_child(
        &self,
        parent: HandleId,
        kind: &str,
        args: &[HostValue],
    ) -> HostResult<HandleId> {
        let flags = DISPATCH_FLAGS(DISPATCH_METHOD.0 | DISPATCH_PROPERTYGET.0);
        let result = self.invoke(parent, kind, flags, args)?;
        let child = result
            .dispatch()
            .ok_or_else(|| type_mismatch(format!("'{kind}' did not return an object")))?;
        Ok(self.adopt(child))
    }

    fn release(&self, handle: HandleId) -> HostResult<()> {
        match self.objects.borrow_mut().remove(&handle) {
            Some(dispatch) => {
                drop(dispatch);
                Ok(())
            }
            None => Err(HostFault::disconnected()),
        }
    }

    fn get_property(&self, handle: HandleId, name: &str) -> HostResult<HostValue> {
        self.invoke(handle, name, DISPATCH_PROPERTYGET, &[])?
            .to_host_value()
    }

    fn set_property(&self, handle: HandleId, name: &str, value: HostValue) -> HostResult<()> {
        self.invoke(handle, name, DISPATCH_PROPERTYPUT, &[value])
            .map(drop)
    }

    fn invoke_method(
        &self,
        handle: HandleId,
        name: &str,
        args: &[HostValue],
    ) -> HostResult<HostValue> {
        let result = self.invoke(handle, name, DISPATCH_METHOD, args)?;
        if result.vt() == VT_DISPATCH.0 {
            tracing::debug!(method = name, "discarding object returned by method");
            return Ok(HostValue::Empty);
        }
        result.to_host_value()
    }

    fn count(&self, handle: HandleId) -> HostResult<usize> {
        count_from_value(self.get_property(handle, "Count")?)
    }

    fn item(&self, handle: HandleId, index: usize) -> HostResult<HandleId> {
        let index = i64::try_from(index).map_err(|_| type_mismatch("index overflow"))?;
        self.create_child(handle, "Item", &[HostValue::Int(index)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use windows::Win32::System::Com::CY;
    use windows::Win32::System::Variant::{VARIANT_0, VARIANT_0_0, VARIANT_0_0_0, VT_CY, VT_NULL};

    fn raw(vt: windows::Win32::System::Variant::VARENUM, arm: VARIANT_0_0_0) -> OwnedVariant {
        OwnedVariant(VARIANT {
            Anonymous: VARIANT_0 {
                Anonymous: ManuallyDrop::new(VARIANT_0_0 {
                    vt,
                    wReserved1: 0,
                    wReserved2: 0,
                    wReserved3: 0,
                    Anonymous: arm,
                }),
            },
        })
    }

    #[test]
    fn scalar_values_survive_the_variant_layer() {
        for value in [
            HostValue::Empty,
            HostValue::Bool(true),
            HostValue::Int(42),
            HostValue::Int(1 << 40),
            HostValue::Float(3.5),
            HostValue::Text("Calibri".into()),
        ] {
            let variant = OwnedVariant::from_host_value(&value);
            assert_eq!(variant.to_host_value().unwrap(), value);
        }
    }

    #[test]
    fn large_ints_use_vt_i8() {
        assert_eq!(OwnedVariant::from_host_value(&HostValue::Int(7)).vt(), VT_I4.0);
        assert_eq!(
            OwnedVariant::from_host_value(&HostValue::Int(i64::MAX)).vt(),
            VT_I8.0
        );
    }

    #[test]
    fn ole_dates_convert_both_ways() {
        let noon = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let ole = naive_to_ole_date(noon);
        assert!((ole - 45352.5).abs() < 1e-9);
        assert_eq!(ole_date_to_naive(ole).unwrap(), noon);
        assert_eq!(
            ole_date_to_naive(0.0).unwrap(),
            NaiveDate::from_ymd_opt(1899, 12, 30)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert!(ole_date_to_naive(f64::NAN).is_err());
    }

    #[test]
    fn currency_is_scaled() {
        let v = raw(
            VT_CY,
            VARIANT_0_0_0 {
                cyVal: CY { int64: 123_456_789 },
            },
        );
        assert_eq!(v.to_host_value().unwrap(), HostValue::Float(12_345.678_9));
    }

    #[test]
    fn null_reads_as_empty() {
        let v = raw(VT_NULL, VARIANT_0_0_0 { lVal: 0 });
        assert_eq!(v.to_host_value().unwrap(), HostValue::Empty);
        assert!(v.dispatch().is_none());
    }

    #[test]
    fn count_accepts_whole_number_variants() {
        assert_eq!(count_from_value(HostValue::Int(4)).unwrap(), 4);
        assert_eq!(count_from_value(HostValue::Float(3.0)).unwrap(), 3);
        assert_eq!(
            count_from_value(HostValue::Float(2.5)).unwrap_err().code,
            DISP_E_TYPEMISMATCH
        );
        assert!(count_from_value(HostValue::Int(-1)).is_err());
        assert!(count_from_value(HostValue::Text("3".into())).is_err());
    }

    #[test]
    fn released_handle_is_disconnected() {
        let host = ComHost::new();
        assert!(host.release(HandleId(1)).unwrap_err().is_disconnected());
        assert!(host
            .get_property(HandleId(1), "Name")
            .unwrap_err()
            .is_disconnected());
    }
}
