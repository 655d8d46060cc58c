use core::{error::Error, fmt};

use ansi_term::{Color, WithFg};

/// Renders an error and its chain of sources.
struct Report<E>(E);

impl<E> fmt::Display for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", WithFg::new(Color::Red, &self.0))?;
        let mut source = self.0.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {}", WithFg::new(Color::Red, s))?;
            source = s.source();
            index += 1;
        }
        writeln!(f)?;
        write!(f, "{}", WithFg::new(Color::DarkGray, DebugAsDisplay(&self.0)))
    }
}

struct DebugAsDisplay<'a, E>(&'a E);

impl<E> fmt::Display for DebugAsDisplay<'_, E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0, f)
    }
}

#[track_caller]
pub fn report<E>(err: E) -> !
where
    E: Error,
{
    let panic_message = WithFg::new(Color::Red, "Critical error occurred");
    panic!("{panic_message}\n\n{}", Report(err));
}
