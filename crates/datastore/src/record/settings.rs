/// Demo settings record.
///
/// Wire schema:
///
/// ```text
/// message Settings {
///   int32 example_counter = 1;
///   int32 sequential_counter = 2;
/// }
/// ```
///
/// New fields get new tags; old files keep decoding with the new fields at
/// their defaults.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Settings {
    #[prost(int32, tag = "1")]
    pub example_counter: i32,
    #[prost(int32, tag = "2")]
    pub sequential_counter: i32,
}

impl Settings {
    pub fn with_example_counter(mut self, value: i32) -> Self {
        self.example_counter = value;
        self
    }

    pub fn with_sequential_counter(mut self, value: i32) -> Self {
        self.sequential_counter = value;
        self
    }
}
