//! 窗口几何描述 `<w>x<h>[(+|-)<x>(+|-)<y>]` 的解析与格式化

use std::fmt;
use std::str::FromStr;

/// 像素坐标
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn add(self, other: Point) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }

    #[inline]
    pub const fn sub(self, other: Point) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

/// 半开区间矩形，包含 `min`，不包含 `max`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    #[inline]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min: Point::new(x0, y0),
            max: Point::new(x1, y1),
        }
    }

    #[inline]
    pub const fn dx(&self) -> i32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub const fn dy(&self) -> i32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub const fn size(&self) -> Point {
        self.max.sub(self.min)
    }

    /// 平移
    #[inline]
    pub const fn add(self, offset: Point) -> Self {
        Self {
            min: self.min.add(offset),
            max: self.max.add(offset),
        }
    }

    /// 两侧各向内收缩 `pt`
    #[inline]
    pub const fn contract(self, pt: Point) -> Self {
        Self {
            min: self.min.add(pt),
            max: self.max.sub(pt),
        }
    }

    /// 四边各向内收缩 `delta` 像素
    #[inline]
    pub const fn shrink(self, delta: i32) -> Self {
        self.contract(Point::new(delta, delta))
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    /// 两个矩形的交集；不相交时为空矩形
    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        if r.is_empty() { Rect::default() } else { r }
    }
}

/// 解析时期望出现的元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Width,
    X,
    Height,
    XOffset,
    YOffset,
    EndOfInput,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Expected::Width => "width",
            Expected::X => "'x'",
            Expected::Height => "height",
            Expected::XOffset => "x offset",
            Expected::YOffset => "y offset",
            Expected::EndOfInput => "end of input",
        };
        f.write_str(s)
    }
}

/// 几何描述解析错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    Empty,
    Unexpected { expected: Expected, position: usize },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::Empty => write!(f, "几何描述为空"),
            GeometryError::Unexpected { expected, position } => {
                write!(f, "位置 {position}: 需要 {expected}")
            }
        }
    }
}

impl std::error::Error for GeometryError {}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    fn error(&self, expected: Expected) -> GeometryError {
        GeometryError::Unexpected {
            expected,
            position: self.pos,
        }
    }

    /// geometry := [size] [signed signed] EOF
    fn geometry(&mut self) -> Result<Rect, GeometryError> {
        let size = match self.peek() {
            Some(b'+' | b'-') => Point::default(),
            _ => self.size()?,
        };
        let (x_at, x) = match self.peek() {
            None => (self.pos, 0),
            _ => (self.pos, self.signed(Expected::XOffset)?),
        };
        let (y_at, y) = match self.peek() {
            None if x_at == self.pos => (self.pos, 0),
            _ => (self.pos, self.signed(Expected::YOffset)?),
        };
        if self.peek().is_some() {
            return Err(self.error(Expected::EndOfInput));
        }

        // 偏移后的右下角不能超出 i32
        let overflow = |expected, position| GeometryError::Unexpected { expected, position };
        let max_x = size.x.checked_add(x).ok_or(overflow(Expected::XOffset, x_at))?;
        let max_y = size.y.checked_add(y).ok_or(overflow(Expected::YOffset, y_at))?;
        Ok(Rect::new(x, y, max_x, max_y))
    }

    /// size := number 'x' number
    fn size(&mut self) -> Result<Point, GeometryError> {
        let width = self.number(Expected::Width)?;
        if self.peek() != Some(b'x') {
            return Err(self.error(Expected::X));
        }
        self.pos += 1;
        let height = self.number(Expected::Height)?;
        Ok(Point::new(width, height))
    }

    fn signed(&mut self, expected: Expected) -> Result<i32, GeometryError> {
        let negative = match self.peek() {
            Some(b'+') => false,
            Some(b'-') => true,
            _ => return Err(self.error(expected)),
        };
        self.pos += 1;
        let n = self.number(expected)?;
        Ok(if negative { -n } else { n })
    }

    fn number(&mut self, expected: Expected) -> Result<i32, GeometryError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error(expected));
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or(GeometryError::Unexpected {
                expected,
                position: start,
            })
    }
}

/// 解析几何描述，例如 `117x20`、`21x18+1+2`、`1x2-3-4`
pub fn parse(geom: &str) -> Result<Rect, GeometryError> {
    if geom.is_empty() {
        return Err(GeometryError::Empty);
    }
    Parser::new(geom).geometry()
}

/// 格式化为几何描述；位于原点时省略偏移
pub fn format(rect: &Rect) -> String {
    if rect.min == Point::default() {
        return format!("{}x{}", rect.max.x, rect.max.y);
    }
    format!(
        "{}x{}{:+}{:+}",
        rect.dx(),
        rect.dy(),
        rect.min.x,
        rect.min.y
    )
}

impl FromStr for Rect {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        for (s, r) in [
            ("1x2", Rect::new(0, 0, 1, 2)),
            ("1x2+3+4", Rect::new(3, 4, 4, 6)),
            ("1x2-3-4", Rect::new(-3, -4, -2, -2)),
            ("+3+4", Rect::new(3, 4, 3, 4)),
            ("1920x1080+1920+0", Rect::new(1920, 0, 3840, 1080)),
        ] {
            assert_eq!(parse(s), Ok(r), "解析 {s:?}");
        }
    }

    #[test]
    fn test_parse_error() {
        for (s, errtext) in [
            ("abc", "width"),
            ("1e3", "'x'"),
            ("0xDEADBEEF", "height"),
            ("1x1x1", "x offset"),
            ("1x1+1", "y offset"),
            ("1x1+1+1+1", "end of input"),
        ] {
            let err = parse(s).unwrap_err();
            assert!(
                err.to_string().contains(errtext),
                "{s:?}: 期望 {errtext:?}，实际 {err}"
            );
        }
    }

    #[test]
    fn test_parse_error_position() {
        assert_eq!(
            parse("1x1+1"),
            Err(GeometryError::Unexpected {
                expected: Expected::YOffset,
                position: 5
            })
        );
        assert_eq!(parse(""), Err(GeometryError::Empty));
        assert!(parse("99999999999x1").is_err());
    }

    #[test]
    fn test_parse_offset_overflow() {
        assert_eq!(
            parse("2147483647x1+1+0"),
            Err(GeometryError::Unexpected {
                expected: Expected::XOffset,
                position: 12
            })
        );
        assert_eq!(
            parse("1x2147483647+0+1"),
            Err(GeometryError::Unexpected {
                expected: Expected::YOffset,
                position: 14
            })
        );
        assert_eq!(
            parse("2147483647x1-1+0"),
            Ok(Rect::new(-1, 0, 2147483646, 1))
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(format(&Rect::new(0, 0, 117, 20)), "117x20");
        assert_eq!(format(&Rect::new(1, 2, 22, 20)), "21x18+1+2");
        assert_eq!(format(&Rect::new(-3, -4, -2, -2)), "1x2-3-4");
        assert_eq!(Rect::new(22, 0, 117, 20).to_string(), "95x20+22+0");
    }

    #[test]
    fn test_from_str() {
        let r: Rect = "38x18+1+1".parse().unwrap();
        assert_eq!(r, Rect::new(1, 1, 39, 19));
        assert!("38y18".parse::<Rect>().is_err());
    }

    #[test]
    fn test_rect_ops() {
        let r = Rect::new(0, 0, 10, 6);
        assert_eq!(r.dx(), 10);
        assert_eq!(r.dy(), 6);
        assert_eq!(r.size(), Point::new(10, 6));
        assert_eq!(r.shrink(1), Rect::new(1, 1, 9, 5));
        assert_eq!(r.contract(Point::new(2, 0)), Rect::new(2, 0, 8, 6));
        assert_eq!(r.add(Point::new(1, 1)), Rect::new(1, 1, 11, 7));
        assert!(r.shrink(3).is_empty());
        assert!(!r.is_empty());
    }

    #[test]
    fn test_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.intersect(&Rect::new(5, 5, 20, 20)), Rect::new(5, 5, 10, 10));
        assert!(a.intersect(&Rect::new(10, 10, 20, 20)).is_empty());
    }
}
