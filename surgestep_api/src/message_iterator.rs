/// The messages addressed to one vertex in one superstep.
///
/// Single pass and not restartable: the iterator owns the vertex's inbox for the round and
/// hands each message out exactly once.
#[derive(Debug)]
pub struct MessageIterator<M> {
    messages: std::vec::IntoIter<M>,
}

impl<M> MessageIterator<M> {
    pub fn new(messages: Vec<M>) -> Self {
        Self { messages: messages.into_iter() }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl<M> Iterator for MessageIterator<M> {
    type Item = M;

    fn next(&mut self) -> Option<M> {
        self.messages.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.messages.size_hint()
    }
}

impl<M> ExactSizeIterator for MessageIterator<M> {}
