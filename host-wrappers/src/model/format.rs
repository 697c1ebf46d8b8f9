use std::rc::Rc;

use crate::enumeration::EnumerationSession;
use crate::errors::{WrapperError, WrapperResult};
use crate::mapping::EnumMapping;
use crate::owned_wrapper;
use crate::registry::DisposableRegistry;
use crate::value::{FromHostValue, HostValue};
use crate::wrapper::{HostObject, WrapperCore};

/// 24-bit colour. The host stores it as a `0x00BBGGRR` integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_host(code: i64) -> WrapperResult<Self> {
        if !(0..=0x00FF_FFFF).contains(&code) {
            return Err(WrapperError::Conversion(format!(
                "colour code {code:#X} out of range"
            )));
        }
        let code = code as u32;
        Ok(Self::rgb(
            (code & 0xFF) as u8,
            ((code >> 8) & 0xFF) as u8,
            ((code >> 16) & 0xFF) as u8,
        ))
    }

    pub fn to_host(self) -> i64 {
        i64::from(self.r) | (i64::from(self.g) << 8) | (i64::from(self.b) << 16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Underline {
    None,
    Single,
    Double,
    Dotted,
}

pub static UNDERLINE: EnumMapping<Underline> = EnumMapping::new(
    "Underline",
    &[
        (Underline::None, 0),
        (Underline::Single, 1),
        (Underline::Double, 3),
        (Underline::Dotted, 4),
    ],
    Underline::None,
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    None,
    Continuous,
    Dash,
    Dot,
    Double,
}

pub static LINE_STYLE: EnumMapping<LineStyle> = EnumMapping::new(
    "LineStyle",
    &[
        (LineStyle::None, -4142),
        (LineStyle::Continuous, 1),
        (LineStyle::Dash, -4115),
        (LineStyle::Dot, -4118),
        (LineStyle::Double, -4119),
    ],
    LineStyle::None,
);

fn color_from_host(value: HostValue) -> WrapperResult<Color> {
    Color::from_host(i64::from_host_value(value)?)
}

/// Character formatting of a range.
pub struct Font {
    core: WrapperCore,
}

owned_wrapper!(Font);

impl HostObject for Font {
    const KIND: &'static str = "Font";

    fn from_core(core: WrapperCore) -> Self {
        Self { core }
    }
}

impl Font {
    /// Default: empty string.
    pub fn name(&self) -> String {
        self.core.get("Name", String::new())
    }

    pub fn set_name(&self, name: &str) -> WrapperResult<()> {
        if name.trim().is_empty() {
            return Err(WrapperError::Argument("font name must not be blank".into()));
        }
        self.core.set("Name", name)
    }

    /// Point size. Default: `0.0`.
    pub fn size(&self) -> f64 {
        self.core.get("Size", 0.0)
    }

    pub fn set_size(&self, points: f64) -> WrapperResult<()> {
        if !points.is_finite() || points <= 0.0 {
            return Err(WrapperError::Argument(format!(
                "font size {points} must be positive"
            )));
        }
        self.core.set("Size", points)
    }

    /// Default: `false`.
    pub fn bold(&self) -> bool {
        self.core.get("Bold", false)
    }

    pub fn set_bold(&self, bold: bool) -> WrapperResult<()> {
        self.core.set("Bold", bold)
    }

    /// Default: [`Color::BLACK`].
    pub fn color(&self) -> Color {
        self.core
            .read_with("Color", Color::BLACK, color_from_host)
            .into_value()
    }

    pub fn set_color(&self, color: Color) -> WrapperResult<()> {
        self.core.set("Color", color.to_host())
    }

    /// Default: [`Underline::None`].
    pub fn underline(&self) -> Underline {
        self.core
            .read_with("Underline", UNDERLINE.fallback(), |value| {
                UNDERLINE.from_host_value(value)
            })
            .into_value()
    }

    pub fn set_underline(&self, underline: Underline) -> WrapperResult<()> {
        let code = UNDERLINE.to_host(underline)?;
        self.core.set("Underline", code)
    }
}

/// The border collection of a range.
pub struct Borders {
    core: WrapperCore,
    edges: DisposableRegistry<Border>,
}

owned_wrapper!(Borders, slots: [edges]);

impl HostObject for Borders {
    const KIND: &'static str = "Borders";

    fn from_core(core: WrapperCore) -> Self {
        Self {
            core,
            edges: DisposableRegistry::new(),
        }
    }
}

impl Borders {
    /// Default: `0`.
    pub fn count(&self) -> usize {
        self.core.count()
    }

    /// Border at `index` (1-based). Collection-owned.
    pub fn item(&self, index: usize) -> WrapperResult<Rc<Border>> {
        let border = Rc::new(self.core.element::<Border>(index)?);
        self.edges.add(Rc::clone(&border));
        Ok(border)
    }

    /// Walks every border. Collection-owned.
    pub fn iter(&self) -> EnumerationSession<'_, Border> {
        EnumerationSession::collection_owned(&self.core, &self.edges)
    }

    /// Applies one line style to every edge at once.
    pub fn set_line_style(&self, style: LineStyle) -> WrapperResult<()> {
        let code = LINE_STYLE.to_host(style)?;
        self.core.set("LineStyle", code)
    }
}

/// One edge of a border collection.
pub struct Border {
    core: WrapperCore,
}

owned_wrapper!(Border);

impl HostObject for Border {
    const KIND: &'static str = "Border";

    fn from_core(core: WrapperCore) -> Self {
        Self { core }
    }
}

impl Border {
    /// Default: [`LineStyle::None`].
    pub fn line_style(&self) -> LineStyle {
        self.core
            .read_with("LineStyle", LINE_STYLE.fallback(), |value| {
                LINE_STYLE.from_host_value(value)
            })
            .into_value()
    }

    pub fn set_line_style(&self, style: LineStyle) -> WrapperResult<()> {
        let code = LINE_STYLE.to_host(style)?;
        self.core.set("LineStyle", code)
    }

    /// Default: [`Color::BLACK`].
    pub fn color(&self) -> Color {
        self.core
            .read_with("Color", Color::BLACK, color_from_host)
            .into_value()
    }

    pub fn set_color(&self, color: Color) -> WrapperResult<()> {
        self.core.set("Color", color.to_host())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_uses_bgr_encoding() {
        let orange = Color::rgb(0xFF, 0x80, 0x00);
        assert_eq!(orange.to_host(), 0x0080FF);
        assert_eq!(Color::from_host(0x0080FF).unwrap(), orange);
        assert!(Color::from_host(-1).is_err());
    }

    #[test]
    fn line_style_fallback_for_unknown_code() {
        assert_eq!(LINE_STYLE.to_domain(9999), LineStyle::None);
        assert_eq!(LINE_STYLE.to_host(LineStyle::Dash).unwrap(), -4115);
    }
}
