use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub struct MultiError<E> {
    errors: Vec<E>,
}

impl<E> MultiError<E> {
    pub fn new(errors: Vec<E>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} chunk workers failed: ", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl<E: Error + 'static> Error for MultiError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|e| e as &dyn Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_display_lists_every_failure() {
        let err = MultiError::new(vec![
            io::Error::new(io::ErrorKind::Other, "chunk 3 rejected"),
            io::Error::new(io::ErrorKind::Other, "chunk 7 rejected"),
        ]);

        assert_eq!(err.len(), 2);
        assert_eq!(
            err.to_string(),
            "2 chunk workers failed: chunk 3 rejected; chunk 7 rejected"
        );
    }

    #[test]
    fn test_source_is_first_failure() {
        let err = MultiError::new(vec![
            io::Error::new(io::ErrorKind::Other, "first"),
            io::Error::new(io::ErrorKind::Other, "second"),
        ]);

        assert_eq!(err.source().unwrap().to_string(), "first");
        assert_eq!(err.into_errors().len(), 2);
    }
}
